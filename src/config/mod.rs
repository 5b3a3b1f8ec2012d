//! Configuration management
//!
//! This module holds the consensus and admission parameters a node runs
//! with: reward schedule, difficulty controller bounds, and the mempool
//! admission policy.

pub mod settings;

pub use settings::{AdmissionPolicy, LedgerConfig, GLOBAL_CONFIG};
