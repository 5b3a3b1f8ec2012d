//! Node replicas and their replication
//!
//! A [`Node`] owns one chain, its mempool and difficulty, and enforces the
//! admission, mining and adoption rules. A [`Network`] is a registry of nodes
//! that share wallets and exchange chains by broadcast.

pub mod cluster;
pub mod node;

pub use cluster::{BroadcastResult, Network};
pub use node::{AdoptionOutcome, HistoryEntry, Node};
