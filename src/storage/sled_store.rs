use crate::core::Block;
use crate::error::{LedgerError, Result};
use crate::storage::ChainStore;
use crate::utils::{deserialize, serialize};
use log::debug;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, IVec, Tree};
use std::path::Path;

// One tree per node; keys are big-endian block indices so iteration is in chain order
const CHAIN_TREE_PREFIX: &str = "chain/";

pub struct SledStore {
    db: Db,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SledStore> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| {
            LedgerError::Database(format!("Failed to open chain store {}: {e}", path.display()))
        })?;
        Ok(SledStore { db })
    }

    /// Every node that has at least one stored block, sorted
    pub fn node_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for name in self.db.tree_names() {
            let Ok(name) = std::str::from_utf8(&name) else {
                continue;
            };
            if let Some(node_id) = name.strip_prefix(CHAIN_TREE_PREFIX) {
                if !self.tree(node_id)?.is_empty() {
                    ids.push(node_id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn tree(&self, node_id: &str) -> Result<Tree> {
        self.db
            .open_tree(format!("{CHAIN_TREE_PREFIX}{node_id}"))
            .map_err(|e| LedgerError::Database(format!("Failed to open chain tree for {node_id}: {e}")))
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| LedgerError::Database(format!("Failed to flush chain store: {e}")))?;
        Ok(())
    }
}

fn index_key(index: u64) -> [u8; 8] {
    index.to_be_bytes()
}

fn transaction_error(err: TransactionError<LedgerError>) -> LedgerError {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => {
            LedgerError::Database(format!("Chain store transaction failed: {err}"))
        }
    }
}

impl ChainStore for SledStore {
    fn load_chain(&self, node_id: &str) -> Result<Option<Vec<Block>>> {
        let tree = self.tree(node_id)?;
        if tree.is_empty() {
            return Ok(None);
        }

        let mut blocks = Vec::with_capacity(tree.len());
        for item in tree.iter() {
            let (_, value) = item.map_err(|e| {
                LedgerError::Database(format!("Failed to iterate chain tree for {node_id}: {e}"))
            })?;
            let block: Block = deserialize(value.as_ref())?;
            blocks.push(block);
        }
        debug!("Loaded {} blocks for node {node_id}", blocks.len());
        Ok(Some(blocks))
    }

    fn append_block(&self, node_id: &str, block: &Block) -> Result<()> {
        let tree = self.tree(node_id)?;
        let index = block.get_index();
        let key = index_key(index);
        let value = serialize(block)?;

        tree.transaction(|tx_tree| {
            if tx_tree.get(&key[..])?.is_some() {
                return Err(ConflictableTransactionError::Abort(
                    LedgerError::BlockPositionConflict { index },
                ));
            }
            if index > 0 && tx_tree.get(&index_key(index - 1)[..])?.is_none() {
                return Err(ConflictableTransactionError::Abort(
                    LedgerError::ChainIntegrityViolation(format!(
                        "Append at index {index} would leave a gap"
                    )),
                ));
            }
            tx_tree.insert(&key[..], value.as_slice())?;
            Ok(())
        })
        .map_err(transaction_error)?;

        self.flush()
    }

    fn replace_chain(&self, node_id: &str, blocks: &[Block]) -> Result<()> {
        let tree = self.tree(node_id)?;
        let existing: Vec<IVec> = tree
            .iter()
            .keys()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| LedgerError::Database(format!("Failed to read chain tree for {node_id}: {e}")))?;
        let encoded = blocks
            .iter()
            .map(|block| Ok((index_key(block.get_index()), serialize(block)?)))
            .collect::<Result<Vec<_>>>()?;

        tree.transaction(|tx_tree| {
            for key in &existing {
                tx_tree.remove(key.clone())?;
            }
            for (key, value) in &encoded {
                tx_tree.insert(&key[..], value.as_slice())?;
            }
            Ok::<(), ConflictableTransactionError<LedgerError>>(())
        })
        .map_err(transaction_error)?;

        debug!("Replaced chain for node {node_id} with {} blocks", blocks.len());
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Blockchain, Transaction};
    use crate::testnet::{alice_keys, mine_test_block};

    fn mined_chain(length: usize) -> Blockchain {
        let miner = alice_keys();
        let mut chain = Blockchain::new();
        while chain.len() < length {
            let block = mine_test_block(&chain, vec![Transaction::coinbase(&miner.address(), 7)], &miner);
            chain = chain.with_block(block).unwrap();
        }
        chain
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let chain = mined_chain(3);
        {
            let store = SledStore::open(dir.path()).unwrap();
            for block in chain.blocks() {
                store.append_block("A", block).unwrap();
            }
        }

        let store = SledStore::open(dir.path()).unwrap();
        let loaded = store.load_chain("A").unwrap().unwrap();
        assert_eq!(loaded, chain.blocks().to_vec());
        assert!(Blockchain::from_blocks(loaded).is_valid());
        assert_eq!(store.load_chain("B").unwrap(), None);
    }

    #[test]
    fn test_append_at_occupied_index_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store.append_block("A", &Block::genesis()).unwrap();

        assert_eq!(
            store.append_block("A", &Block::genesis()),
            Err(LedgerError::BlockPositionConflict { index: 0 })
        );
        assert_eq!(store.load_chain("A").unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_append_with_gap_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let orphan = Block::new(2, "X".to_string(), 0);
        assert!(matches!(
            store.append_block("A", &orphan),
            Err(LedgerError::ChainIntegrityViolation(_))
        ));
    }

    #[test]
    fn test_replace_shrinks_and_grows() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let long = mined_chain(4);
        store.replace_chain("A", long.blocks()).unwrap();
        assert_eq!(store.load_chain("A").unwrap().unwrap().len(), 4);

        let short = Blockchain::new();
        store.replace_chain("A", short.blocks()).unwrap();
        assert_eq!(store.load_chain("A").unwrap().unwrap(), short.blocks().to_vec());
    }

    #[test]
    fn test_node_ids_lists_populated_trees() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store.append_block("B", &Block::genesis()).unwrap();
        store.append_block("A", &Block::genesis()).unwrap();
        // Opening a tree for a lookup must not make the node appear
        assert_eq!(store.load_chain("C").unwrap(), None);

        assert_eq!(store.node_ids().unwrap(), vec!["A".to_string(), "B".to_string()]);
    }
}
