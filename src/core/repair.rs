//! Out-of-band block repair
//!
//! Appended blocks are immutable everywhere else in the crate. This module is
//! the single exception: a manual recovery tool that rewrites one block's
//! signature and recomputes its hash. The result usually no longer meets its
//! difficulty and breaks the link to the next block, which is exactly what the
//! validity view is meant to surface.

use crate::core::Blockchain;
use crate::error::{LedgerError, Result};
use log::warn;

/// Build a copy of `chain` in which block `index` carries `signature` (when
/// given) and a freshly recomputed hash. The input chain is not modified.
pub fn rewrite_block(
    chain: &Blockchain,
    index: u64,
    signature: Option<Vec<u8>>,
) -> Result<Blockchain> {
    let mut blocks = chain.blocks().to_vec();
    let position = usize::try_from(index)
        .ok()
        .filter(|position| *position < blocks.len())
        .ok_or_else(|| {
            LedgerError::ChainIntegrityViolation(format!("No block at index {index} to repair"))
        })?;

    let block = &mut blocks[position];
    if let Some(signature) = signature {
        block.replace_signature(signature);
    }
    block.rehash();

    warn!(
        "Block {index} rewritten out of band; new hash {}",
        block.get_hash()
    );
    Ok(Blockchain::from_blocks(blocks))
}
