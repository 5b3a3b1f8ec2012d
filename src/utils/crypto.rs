use chrono::{DateTime, SecondsFormat, Utc};
use data_encoding::{BASE64, HEXUPPER};
use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, UnparsedPublicKey, RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_SHA256};
use zeroize::Zeroizing;

use crate::error::{LedgerError, Result};

/// Current UTC time in whole milliseconds since the Unix epoch.
pub fn current_timestamp() -> i64 {
    truncate_to_millis(Utc::now())
}

/// Drop sub-millisecond precision so a hash recomputed after a storage
/// round-trip sees the same timestamp.
pub fn truncate_to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// ISO-8601 UTC with exactly three fractional digits, e.g. `2025-01-01T00:00:00.000Z`.
pub fn format_timestamp(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(time) => time.to_rfc3339_opts(SecondsFormat::Millis, true),
        // Outside chrono's range; still deterministic
        None => millis.to_string(),
    }
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

/// SHA-256 rendered as uppercase hex with no separators.
pub fn sha256_hex(data: &[u8]) -> String {
    HEXUPPER.encode(&sha256_digest(data))
}

pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

pub fn base64_decode(text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text.trim().as_bytes())
        .map_err(|e| LedgerError::Serialization(format!("Invalid base64: {e}")))
}

/// Strip PEM armour and return the DER body. The buffer is wiped on drop.
pub fn decode_pem(pem: &str) -> Result<Zeroizing<Vec<u8>>> {
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect();

    if body.is_empty() {
        return Err(LedgerError::InvalidKeyMaterial(
            "PEM input has no body".to_string(),
        ));
    }

    let der = BASE64
        .decode(body.as_bytes())
        .map_err(|e| LedgerError::InvalidKeyMaterial(format!("Invalid PEM body: {e}")))?;
    Ok(Zeroizing::new(der))
}

/// Parse an unencrypted PKCS#8 RSA private key.
pub fn parse_rsa_pkcs8(pkcs8: &[u8]) -> Result<RsaKeyPair> {
    RsaKeyPair::from_pkcs8(pkcs8)
        .map_err(|e| LedgerError::InvalidKeyMaterial(format!("Rejected RSA PKCS#8 key: {e}")))
}

/// RSA PKCS#1 v1.5 signature over the SHA-256 digest of `message`.
pub fn rsa_pkcs1_sha256_sign(key_pair: &RsaKeyPair, message: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(&RSA_PKCS1_SHA256, &rng, message, &mut signature)
        .map_err(|_| LedgerError::InvalidKeyMaterial("RSA signing failed".to_string()))?;
    Ok(signature)
}

/// Verify a PKCS#1 v1.5 / SHA-256 signature against a DER `RSAPublicKey`.
///
/// Malformed keys and signatures simply fail verification.
pub fn rsa_pkcs1_sha256_verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    if public_key.is_empty() || signature.is_empty() {
        return false;
    }
    let peer_public_key = UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA256, public_key);
    peer_public_key.verify(message, signature).is_ok()
}
