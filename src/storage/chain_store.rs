use crate::core::Block;
use crate::error::{LedgerError, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Persistence contract for node chains.
///
/// Each call is atomic on its own. Nodes write here first and only swap
/// their in-memory chain once the store has accepted the change.
pub trait ChainStore: Send + Sync {
    /// Blocks for `node_id` in index order, or `None` if the node has never
    /// stored anything
    fn load_chain(&self, node_id: &str) -> Result<Option<Vec<Block>>>;

    /// Store `block` at its own index. An occupied index is a
    /// [`LedgerError::BlockPositionConflict`], never an overwrite.
    fn append_block(&self, node_id: &str, block: &Block) -> Result<()>;

    /// Replace the whole chain for `node_id`
    fn replace_chain(&self, node_id: &str, blocks: &[Block]) -> Result<()>;
}

/// Check that `block` goes exactly at the end of a chain of `len` blocks
pub(crate) fn check_append_position(len: usize, block: &Block) -> Result<()> {
    let index = block.get_index();
    if index < len as u64 {
        return Err(LedgerError::BlockPositionConflict { index });
    }
    if index > len as u64 {
        return Err(LedgerError::ChainIntegrityViolation(format!(
            "Append at index {index} would leave a gap after {len} blocks"
        )));
    }
    Ok(())
}

/// In-process store, mainly for tests and simulations
#[derive(Default)]
pub struct MemoryStore {
    chains: RwLock<HashMap<String, Vec<Block>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl ChainStore for MemoryStore {
    fn load_chain(&self, node_id: &str) -> Result<Option<Vec<Block>>> {
        let chains = self
            .chains
            .read()
            .map_err(|_| LedgerError::Database("Memory store lock poisoned".to_string()))?;
        Ok(chains.get(node_id).cloned())
    }

    fn append_block(&self, node_id: &str, block: &Block) -> Result<()> {
        let mut chains = self
            .chains
            .write()
            .map_err(|_| LedgerError::Database("Memory store lock poisoned".to_string()))?;
        let chain = chains.entry(node_id.to_string()).or_default();
        check_append_position(chain.len(), block)?;
        chain.push(block.clone());
        Ok(())
    }

    fn replace_chain(&self, node_id: &str, blocks: &[Block]) -> Result<()> {
        let mut chains = self
            .chains
            .write()
            .map_err(|_| LedgerError::Database("Memory store lock poisoned".to_string()))?;
        chains.insert(node_id.to_string(), blocks.to_vec());
        Ok(())
    }
}
