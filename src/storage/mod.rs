//! Data storage and persistence
//!
//! This module holds the per-node pool of pending transactions and the
//! persistence contract node chains are written through, with an in-memory
//! and a sled-backed implementation.

pub mod chain_store;
pub mod memory_pool;
pub mod sled_store;

pub use chain_store::{ChainStore, MemoryStore};
pub use memory_pool::{MemoryPool, PendingEntry};
pub use sled_store::SledStore;
