// A transaction moves value between two addresses in an account model.
// What gets signed is the canonical payload, never the struct itself, so the
// payload format is part of the wire contract.

use crate::core::monetary::{format_amount, Amount};
use crate::error::Result;
use crate::utils::{base64_encode, rsa_pkcs1_sha256_verify, sha256_hex};
use crate::wallet::KeyPair;
use serde::{Deserialize, Serialize};

/// Sentinel sender for reward-issuing transactions
pub const COINBASE_ADDRESS: &str = "COINBASE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    from_address: String,
    to_address: String,
    amount: Amount,
    fee: Amount,
    note: Option<String>,
    signature: Option<Vec<u8>>, // absent only on coinbase entries
}

impl Transaction {
    /// Create an unsigned transfer
    pub fn new(from: &str, to: &str, amount: Amount, fee: Amount) -> Transaction {
        Transaction {
            from_address: from.to_string(),
            to_address: to.to_string(),
            amount,
            fee,
            note: None,
            signature: None,
        }
    }

    /// Reward-issuing transaction. Credit-only, never signed.
    pub fn coinbase(to: &str, amount: Amount) -> Transaction {
        Transaction::new(COINBASE_ADDRESS, to, amount, 0)
    }

    pub fn with_note(mut self, note: &str) -> Transaction {
        self.note = Some(note.to_string());
        self
    }

    /// `from|to|amount|fee` with both numbers at eight fractional digits.
    pub fn canonical_payload(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.from_address,
            self.to_address,
            format_amount(self.amount),
            format_amount(self.fee)
        )
    }

    /// Sign the canonical payload. The key is only borrowed for the call.
    pub fn sign(&mut self, key: &KeyPair) -> Result<()> {
        let signature = key.sign(self.canonical_payload().as_bytes())?;
        self.signature = Some(signature);
        Ok(())
    }

    /// Builder form of [`Transaction::sign`]
    pub fn signed(mut self, key: &KeyPair) -> Result<Transaction> {
        self.sign(key)?;
        Ok(self)
    }

    /// Check the stored signature against `public_key` (DER `RSAPublicKey`).
    /// Missing or malformed signatures fail closed.
    pub fn verify_signature(&self, public_key: &[u8]) -> bool {
        match &self.signature {
            Some(signature) => rsa_pkcs1_sha256_verify(
                public_key,
                signature,
                self.canonical_payload().as_bytes(),
            ),
            None => false,
        }
    }

    /// Content identifier: hash of the payload plus signature. Used to match
    /// pending entries against confirmed ones.
    pub fn id(&self) -> String {
        let signature = self
            .signature
            .as_deref()
            .map(base64_encode)
            .unwrap_or_default();
        sha256_hex(format!("{}|{}", self.canonical_payload(), signature).as_bytes())
    }

    pub fn is_coinbase(&self) -> bool {
        self.from_address == COINBASE_ADDRESS
    }

    /// What the sender is debited: `amount + fee`
    pub fn total_debit(&self) -> u128 {
        self.amount as u128 + self.fee as u128
    }

    pub fn get_from_address(&self) -> &str {
        self.from_address.as_str()
    }

    pub fn get_to_address(&self) -> &str {
        self.to_address.as_str()
    }

    pub fn get_amount(&self) -> Amount {
        self.amount
    }

    pub fn get_fee(&self) -> Amount {
        self.fee
    }

    pub fn get_note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn get_signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }
}
