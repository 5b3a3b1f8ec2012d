// The chain itself is an immutable value: appending or adopting builds a new
// Blockchain and the owning node swaps a single reference. Readers holding an
// older snapshot keep a consistent view for as long as they need it.
//
// Balances are never cached. Every query replays the chain from genesis,
// because adopting a longer chain can rewrite any running total.

use crate::core::block::GENESIS_PREV_HASH;
use crate::core::{Block, Transaction};
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Address -> balance in base units. Signed because a pending overlay may
/// overspend.
pub type Balances = HashMap<String, i128>;

/// Per-block result of a full chain walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockValidation {
    pub index: u64,
    pub hash: String,
    /// Position and `prevHash` agree with the predecessor
    pub linked: bool,
    /// Stored hash recomputes and meets the stored difficulty
    pub proof_valid: bool,
    /// Signature verifies against the embedded key (genesis: always true)
    pub signature_valid: bool,
    /// Every block up to and including this one passed all checks
    pub is_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blockchain {
    blocks: Vec<Block>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// A chain holding only the shared genesis block
    pub fn new() -> Blockchain {
        Blockchain {
            blocks: vec![Block::genesis()],
        }
    }

    /// Wrap blocks as-is. Nothing is checked; call [`Blockchain::verify`]
    /// before trusting the result.
    pub fn from_blocks(blocks: Vec<Block>) -> Blockchain {
        Blockchain { blocks }
    }

    pub fn blocks(&self) -> &[Block] {
        self.blocks.as_slice()
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn get_block(&self, index: u64) -> Option<&Block> {
        self.blocks.get(usize::try_from(index).ok()?)
    }

    /// Index the next block must carry
    pub fn next_index(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// New chain with `block` appended.
    ///
    /// The block must sit exactly at the next index and link to the tip;
    /// anything else means the caller raced another writer.
    pub fn with_block(&self, block: Block) -> Result<Blockchain> {
        let expected = self.next_index();
        if block.get_index() != expected {
            return Err(LedgerError::BlockPositionConflict {
                index: block.get_index(),
            });
        }
        let tip_hash = self.tip().map(Block::get_hash).unwrap_or(GENESIS_PREV_HASH);
        if block.get_prev_hash() != tip_hash {
            return Err(LedgerError::ChainIntegrityViolation(format!(
                "Block {} does not link to tip {tip_hash}",
                block.get_index()
            )));
        }

        let mut blocks = self.blocks.clone();
        blocks.push(block);
        Ok(Blockchain { blocks })
    }

    /// Check one block against its predecessor (`None` for genesis)
    fn check_block(position: usize, block: &Block, prev: Option<&Block>) -> Result<()> {
        if block.get_index() != position as u64 {
            return Err(LedgerError::ChainIntegrityViolation(format!(
                "Block at position {position} claims index {}",
                block.get_index()
            )));
        }

        let prev = match prev {
            None => {
                if block.get_prev_hash() != GENESIS_PREV_HASH {
                    return Err(LedgerError::ChainIntegrityViolation(format!(
                        "Genesis prevHash is {:?}, expected {GENESIS_PREV_HASH:?}",
                        block.get_prev_hash()
                    )));
                }
                // Every node shares the same fixed genesis
                if *block != Block::genesis() {
                    return Err(LedgerError::ChainIntegrityViolation(
                        "Genesis block differs from the shared genesis".to_string(),
                    ));
                }
                return Ok(());
            }
            Some(prev) => prev,
        };

        if block.get_prev_hash() != prev.get_hash() {
            return Err(LedgerError::ChainIntegrityViolation(format!(
                "Block {position} prevHash does not match block {}",
                prev.get_index()
            )));
        }
        if block.get_hash() != block.compute_hash() {
            return Err(LedgerError::ChainIntegrityViolation(format!(
                "Block {position} hash does not match its contents"
            )));
        }
        if !block.verify() {
            return Err(LedgerError::InvalidSignature(format!(
                "Block {position} signature does not verify"
            )));
        }
        if !block.has_valid_proof() {
            return Err(LedgerError::ChainIntegrityViolation(format!(
                "Block {position} does not meet difficulty {}",
                block.get_difficulty()
            )));
        }
        Ok(())
    }

    /// Full re-verification from genesis; reports the first failure.
    pub fn verify(&self) -> Result<()> {
        if self.blocks.is_empty() {
            return Err(LedgerError::ChainIntegrityViolation(
                "Chain has no genesis block".to_string(),
            ));
        }
        let mut prev: Option<&Block> = None;
        for (position, block) in self.blocks.iter().enumerate() {
            Self::check_block(position, block, prev)?;
            prev = Some(block);
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    /// Per-block view of chain health. Once one block fails, it and every
    /// later block are marked invalid, even if individually well formed.
    pub fn validate_blocks(&self) -> Vec<BlockValidation> {
        let mut result = Vec::with_capacity(self.blocks.len());
        let mut still_valid = true;

        for (position, block) in self.blocks.iter().enumerate() {
            let prev = position.checked_sub(1).map(|i| &self.blocks[i]);
            let block_ok = Self::check_block(position, block, prev).is_ok();
            still_valid = still_valid && block_ok;

            let linked = block.get_index() == position as u64
                && match prev {
                    Some(prev) => block.get_prev_hash() == prev.get_hash(),
                    None => block.get_prev_hash() == GENESIS_PREV_HASH,
                };

            result.push(BlockValidation {
                index: block.get_index(),
                hash: block.get_hash().to_string(),
                linked,
                proof_valid: block.is_genesis() || block.has_valid_proof(),
                signature_valid: block.is_genesis() || block.verify(),
                is_valid: still_valid,
            });
        }
        result
    }

    /// [`Blockchain::validate_blocks`] rendered as a JSON array
    pub fn validation_report_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.validate_blocks())?)
    }

    /// Signature status of each block on its own, without linkage
    pub fn signature_report(&self) -> Vec<(u64, bool)> {
        self.blocks
            .iter()
            .map(|block| (block.get_index(), block.is_genesis() || block.verify()))
            .collect()
    }

    /// Replay every transaction in index order, then `overlay` in order.
    pub fn compute_balances(&self, overlay: &[Transaction]) -> Balances {
        let mut balances = Balances::new();
        for block in &self.blocks {
            for tx in block.get_transactions() {
                apply_transaction(&mut balances, tx);
            }
        }
        for tx in overlay {
            apply_transaction(&mut balances, tx);
        }
        balances
    }

    /// Confirmed balance of one address
    pub fn balance_of(&self, address: &str) -> i128 {
        self.compute_balances(&[])
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    /// Ids of every confirmed transaction
    pub fn transaction_ids(&self) -> HashSet<String> {
        self.blocks
            .iter()
            .flat_map(|block| block.get_transactions())
            .map(Transaction::id)
            .collect()
    }

    /// Confirmed transactions touching `address`, newest block first
    pub fn transactions_for(&self, address: &str) -> Vec<(u64, Transaction)> {
        self.blocks
            .iter()
            .rev()
            .flat_map(|block| {
                block
                    .get_transactions()
                    .iter()
                    .rev()
                    .filter(|tx| tx.get_from_address() == address || tx.get_to_address() == address)
                    .map(move |tx| (block.get_index(), tx.clone()))
            })
            .collect()
    }
}

/// Credit the recipient; debit `amount + fee` from any non-coinbase sender.
fn apply_transaction(balances: &mut Balances, tx: &Transaction) {
    *balances.entry(tx.get_to_address().to_string()).or_insert(0) += tx.get_amount() as i128;
    if !tx.is_coinbase() {
        *balances
            .entry(tx.get_from_address().to_string())
            .or_insert(0) -= tx.total_debit() as i128;
    }
}
