//! Error handling for the ledger
//!
//! Every fallible operation in the crate returns [`LedgerError`]. Validation
//! failures (bad signature, broken linkage, missing funds) are ordinary
//! values the caller can branch on; nothing in the core panics on bad input.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error taxonomy for ledger operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A transaction or block signature did not verify
    InvalidSignature(String),
    /// The sender's confirmed balance does not cover `amount + fee`
    InsufficientFunds {
        address: String,
        required: u64,
        available: i128,
    },
    /// No wallet is registered under the declared sender address
    UnknownSender(String),
    /// The mining key does not map to any registered wallet
    UnregisteredMiner,
    /// Hash, linkage or proof-of-work mismatch
    ChainIntegrityViolation(String),
    /// A block already exists at the index we tried to append at
    BlockPositionConflict { index: u64 },
    /// Key bytes could not be parsed as RSA key material
    InvalidKeyMaterial(String),
    /// Malformed decimal amount
    InvalidAmount(String),
    /// No node is known under this identity
    UnknownNode(String),
    /// Configuration errors
    Config(String),
    /// Persistence errors
    Database(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::InvalidSignature(msg) => write!(f, "Invalid signature: {msg}"),
            LedgerError::InsufficientFunds {
                address,
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds for {address}: required {}, available {}",
                    crate::core::monetary::format_amount(*required),
                    crate::core::monetary::format_balance(*available)
                )
            }
            LedgerError::UnknownSender(addr) => write!(f, "Unknown sender: {addr}"),
            LedgerError::UnregisteredMiner => {
                write!(f, "Miner wallet not found; register the public key first")
            }
            LedgerError::ChainIntegrityViolation(msg) => {
                write!(f, "Chain integrity violation: {msg}")
            }
            LedgerError::BlockPositionConflict { index } => {
                write!(f, "Block position conflict at index {index}")
            }
            LedgerError::InvalidKeyMaterial(msg) => write!(f, "Invalid key material: {msg}"),
            LedgerError::InvalidAmount(msg) => write!(f, "Invalid amount: {msg}"),
            LedgerError::UnknownNode(id) => write!(f, "Unknown node: {id}"),
            LedgerError::Config(msg) => write!(f, "Configuration error: {msg}"),
            LedgerError::Database(msg) => write!(f, "Database error: {msg}"),
            LedgerError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            LedgerError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(err: bincode::error::EncodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for LedgerError {
    fn from(err: bincode::error::DecodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}
