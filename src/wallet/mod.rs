//! Wallet identities and key handling
//!
//! This module turns caller-supplied RSA key material into signing keys,
//! derives addresses from public keys, and keeps the wallet registry that
//! maps addresses back to public keys for admission and mining.

#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use wallet::{derive_address, KeyPair, Wallet, ADDRESS_HASH_LEN, ADDRESS_PREFIX};
pub use wallets::WalletRegistry;
