//! Utility functions and helpers
//!
//! This module contains the cryptographic primitives (SHA-256, RSA
//! PKCS#1 v1.5 signing), timestamp handling and the bincode helpers used
//! by the persistence layer.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base64_decode, base64_encode, current_timestamp, decode_pem, format_timestamp,
    parse_rsa_pkcs8, rsa_pkcs1_sha256_sign, rsa_pkcs1_sha256_verify, sha256_digest, sha256_hex,
    truncate_to_millis,
};

pub use serialization::{deserialize, serialize};
