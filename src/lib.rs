//! # pow-ledger - A Proof-of-Work Ledger With Replicated Nodes
//!
//! This is a small but complete proof-of-work ledger: signed value transfers,
//! hash-linked blocks mined by nonce search, and a set of independent nodes
//! that converge on the longest valid chain.
//! When I come back to this code, here's what I need to remember:
//!
//! ## What I Built
//! - **Account Ledger**: Balances are replayed from genesis on every query, never cached
//! - **Proof-of-Work**: Cancellable nonce search with progress events and ±1 difficulty retarget
//! - **Signatures**: RSA PKCS#1 v1.5 over SHA-256 for transactions and block hashes
//! - **Admission Control**: Registered sender, valid signature, covered balance, in that order
//! - **Multi-Node**: Longest-valid-chain adoption with mempool purge, plus broadcast
//! - **Persistence**: Pluggable chain store with in-memory and Sled backends
//!
//! ## How I Organized My Code
//! - `core/`: Blocks, transactions, mining, chain validation, rewards, retarget, repair
//! - `wallet/`: Key material, address derivation, wallet registry
//! - `network/`: Per-node state machine and the node cluster
//! - `storage/`: Mempool and chain persistence
//! - `config/`: Consensus and admission parameters
//! - `utils/`: Cryptographic helpers and bincode encoding
//! - `cli/`: Command-line interface for the demo binary
//!
//! ## Key Design Decisions I Made
//! - A chain is an immutable value; nodes swap an `Arc` under one lock per node
//! - Mining never holds a lock while hashing, so admission keeps flowing
//! - Amounts are fixed-point `u64` base units (10^-8), never floats
//! - Key material is always passed in explicitly; nothing holds private keys
//!
//! ## When I Need to Understand Something
//! 1. Start with `network/node.rs` for admission, mining and adoption
//! 2. Look at `core/blockchain.rs` for validation and balance replay
//! 3. Check `core/block.rs` for the hash input and signing order
//! 4. Review `core/difficulty.rs` for the retarget controller

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{AdmissionPolicy, LedgerConfig, GLOBAL_CONFIG};
pub use core::{
    block_reward, format_amount, parse_amount, Amount, Balances, Block, BlockValidation,
    Blockchain, CancellationToken, MiningProgress, ProgressSink, ProofOfWork, Transaction,
    COINBASE_ADDRESS, UNITS_PER_COIN,
};
pub use error::{LedgerError, Result};
pub use network::{AdoptionOutcome, BroadcastResult, HistoryEntry, Network, Node};
pub use storage::{ChainStore, MemoryPool, MemoryStore, SledStore};
pub use utils::{current_timestamp, sha256_digest, sha256_hex};
pub use wallet::{derive_address, KeyPair, Wallet, WalletRegistry};
