//! Core ledger functionality
//!
//! This module contains the ledger engine proper: transactions, blocks and
//! their proof-of-work, whole-chain validation and balance replay, the
//! reward schedule and the difficulty controller.

pub mod block;
pub mod blockchain;
pub mod difficulty;
pub mod monetary;
pub mod proof_of_work;
pub mod repair;
pub mod transaction;

pub use block::{Block, GENESIS_PREV_HASH, GENESIS_TIMESTAMP};
pub use blockchain::{Balances, BlockValidation, Blockchain};
pub use difficulty::DifficultyAdjustment;
pub use monetary::{block_reward, format_amount, parse_amount, Amount, UNITS_PER_COIN};
pub use proof_of_work::{
    meets_difficulty, CancellationToken, MiningControl, MiningOutcome, MiningProgress,
    ProgressSink, ProofOfWork,
};
pub use transaction::{Transaction, COINBASE_ADDRESS};
