//! Shared fixtures for unit tests
//!
//! Fixed RSA key pairs, a low-difficulty config and helpers for building
//! small mined chains.

pub mod test_utils;

pub use test_utils::*;
