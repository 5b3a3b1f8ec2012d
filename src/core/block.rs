use crate::core::proof_of_work::{CancellationToken, MiningControl, MiningOutcome};
use crate::core::{ProofOfWork, Transaction};
use crate::utils::{current_timestamp, format_timestamp, rsa_pkcs1_sha256_verify, sha256_hex};
use crate::error::Result;
use crate::wallet::KeyPair;
use log::info;
use serde::{Deserialize, Serialize};

/// `prevHash` carried by every genesis block
pub const GENESIS_PREV_HASH: &str = "0";

/// 2025-01-01T00:00:00.000Z, shared by every node's genesis
pub const GENESIS_TIMESTAMP: i64 = 1_735_689_600_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    index: u64,
    prev_hash: String,
    timestamp: i64, // UTC milliseconds; already truncated
    nonce: u64,
    difficulty: u32, // fixed when mined
    transactions: Vec<Transaction>,
    hash: String,
    signature: Option<Vec<u8>>,
    signer_public_key: Option<Vec<u8>>,
    mining_duration_ms: u64, // informational, not hashed
}

impl Block {
    /// Empty block (no transactions, nonce 0) with its hash already computed
    pub fn new(index: u64, prev_hash: String, timestamp: i64) -> Block {
        let mut block = Block {
            index,
            prev_hash,
            timestamp,
            nonce: 0,
            difficulty: 0,
            transactions: Vec::new(),
            hash: String::new(),
            signature: None,
            signer_public_key: None,
            mining_duration_ms: 0,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Candidate for the next position in a chain, stamped with the current time
    pub fn new_candidate(index: u64, prev_hash: &str) -> Block {
        Block::new(index, prev_hash.to_string(), current_timestamp())
    }

    /// The fixed genesis block every node starts from
    pub fn genesis() -> Block {
        Block::new(0, GENESIS_PREV_HASH.to_string(), GENESIS_TIMESTAMP)
    }

    /// Replace the transaction list. Order is significant: it feeds the hash.
    pub fn set_transactions(&mut self, transactions: Vec<Transaction>) {
        self.transactions = transactions;
        self.hash = self.compute_hash();
    }

    fn canonical_transactions(&self) -> String {
        self.transactions
            .iter()
            .map(Transaction::canonical_payload)
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Hash input split around the nonce:
    /// `index|prevHash|timestamp|` and `|difficulty|transactions`
    pub(crate) fn hash_input_parts(&self, difficulty: u32) -> (String, String) {
        let prefix = format!(
            "{}|{}|{}|",
            self.index,
            self.prev_hash,
            format_timestamp(self.timestamp)
        );
        let suffix = format!("|{}|{}", difficulty, self.canonical_transactions());
        (prefix, suffix)
    }

    /// SHA-256 over `index|prevHash|timestamp|nonce|difficulty|transactions`
    pub fn compute_hash(&self) -> String {
        let (prefix, suffix) = self.hash_input_parts(self.difficulty);
        sha256_hex(format!("{prefix}{}{suffix}", self.nonce).as_bytes())
    }

    /// Run proof-of-work to completion at `difficulty`.
    pub fn mine(&mut self, difficulty: u32) {
        let token = CancellationToken::new();
        // An uncancelled search only ends when it finds a hash
        let _ = self.mine_with(difficulty, &MiningControl::new(&token));
    }

    /// Cancellable proof-of-work. Returns `false` if the search was cancelled,
    /// in which case the block is left exactly as it was.
    pub fn mine_with(&mut self, difficulty: u32, control: &MiningControl<'_>) -> bool {
        let pow = ProofOfWork::new_proof_of_work(self, difficulty);
        match pow.run(control) {
            MiningOutcome::Mined {
                nonce,
                hash,
                duration_ms,
                ..
            } => {
                self.difficulty = difficulty;
                self.nonce = nonce;
                self.hash = hash;
                self.mining_duration_ms = duration_ms;
                // Any earlier signature covered a different hash
                self.signature = None;
                self.signer_public_key = None;
                true
            }
            MiningOutcome::Cancelled { .. } => false,
        }
    }

    /// Sign the block hash and embed the signer's public key.
    /// Must happen after mining; re-mining discards the signature.
    pub fn sign(&mut self, key: &KeyPair) -> Result<()> {
        let signature = key.sign(self.hash.as_bytes())?;
        self.signature = Some(signature);
        self.signer_public_key = Some(key.public_key().to_vec());
        info!("Signed block {} by {}", self.index, key.address());
        Ok(())
    }

    /// Verify the embedded signature over the stored hash with the embedded
    /// key. Missing or malformed parts yield `false`.
    pub fn verify(&self) -> bool {
        match (&self.signature, &self.signer_public_key) {
            (Some(signature), Some(public_key)) if !self.hash.is_empty() => {
                rsa_pkcs1_sha256_verify(public_key, signature, self.hash.as_bytes())
            }
            _ => false,
        }
    }

    /// Hash is untampered and satisfies the stored difficulty.
    /// Says nothing about the signature.
    pub fn has_valid_proof(&self) -> bool {
        ProofOfWork::validate(self)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Test block with a recorded mining time (for testing only)
    #[cfg(test)]
    pub(crate) fn with_mining_duration(mut self, duration_ms: u64) -> Block {
        self.mining_duration_ms = duration_ms;
        self
    }

    pub(crate) fn replace_signature(&mut self, signature: Vec<u8>) {
        self.signature = Some(signature);
    }

    pub(crate) fn rehash(&mut self) {
        self.hash = self.compute_hash();
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_prev_hash(&self) -> &str {
        self.prev_hash.as_str()
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn get_signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    pub fn get_signer_public_key(&self) -> Option<&[u8]> {
        self.signer_public_key.as_deref()
    }

    pub fn get_mining_duration_ms(&self) -> u64 {
        self.mining_duration_ms
    }
}
