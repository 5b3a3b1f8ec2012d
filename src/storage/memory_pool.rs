use crate::core::Transaction;
use log::error;
use std::collections::HashSet;
use std::sync::RwLock;

/// A pending transaction tagged with its admission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub seq: u64,
    pub tx: Transaction,
}

#[derive(Default)]
struct PoolInner {
    next_seq: u64,
    entries: Vec<PendingEntry>,
}

/// Per-node pool of admitted transactions, kept in admission order.
///
/// Entries carry a sequence number so mining can remove exactly the entries
/// it packaged, leaving anything admitted while it was hashing.
pub struct MemoryPool {
    inner: RwLock<PoolInner>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(PoolInner::default()),
        }
    }

    /// Append a transaction and return its sequence number
    pub fn add(&self, tx: Transaction) -> Option<u64> {
        match self.inner.write() {
            Ok(mut pool) => {
                let seq = pool.next_seq;
                pool.next_seq += 1;
                pool.entries.push(PendingEntry { seq, tx });
                Some(seq)
            }
            Err(_) => {
                error!("Failed to acquire write lock on memory pool");
                None
            }
        }
    }

    /// Copy of the current entries, in admission order
    pub fn snapshot(&self) -> Vec<PendingEntry> {
        match self.inner.read() {
            Ok(pool) => pool.entries.clone(),
            Err(_) => {
                error!("Failed to acquire read lock on memory pool");
                Vec::new()
            }
        }
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        self.snapshot().into_iter().map(|entry| entry.tx).collect()
    }

    /// Drop the entries with these sequence numbers (those a block packaged)
    pub fn remove_sequences(&self, sequences: &HashSet<u64>) -> usize {
        self.retain(|entry| !sequences.contains(&entry.seq))
    }

    /// Drop every entry whose id is already confirmed on chain
    pub fn purge_confirmed(&self, confirmed_ids: &HashSet<String>) -> usize {
        self.retain(|entry| !confirmed_ids.contains(&entry.tx.id()))
    }

    fn retain<F: Fn(&PendingEntry) -> bool>(&self, keep: F) -> usize {
        match self.inner.write() {
            Ok(mut pool) => {
                let before = pool.entries.len();
                pool.entries.retain(|entry| keep(entry));
                before - pool.entries.len()
            }
            Err(_) => {
                error!("Failed to acquire write lock on memory pool");
                0
            }
        }
    }

    pub fn contains(&self, txid: &str) -> bool {
        match self.inner.read() {
            Ok(pool) => pool.entries.iter().any(|entry| entry.tx.id() == txid),
            Err(_) => {
                error!("Failed to acquire read lock on memory pool");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(pool) => pool.entries.len(),
            Err(_) => {
                error!("Failed to acquire read lock on memory pool");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(amount: u64) -> Transaction {
        Transaction::new("ADDR_A", "ADDR_B", amount, 0)
    }

    #[test]
    fn test_preserves_admission_order() {
        let pool = MemoryPool::new();
        pool.add(tx(3));
        pool.add(tx(1));
        pool.add(tx(2));

        let amounts: Vec<u64> = pool.get_all().iter().map(Transaction::get_amount).collect();
        assert_eq!(amounts, vec![3, 1, 2]);
    }

    #[test]
    fn test_remove_only_packaged_sequences() {
        let pool = MemoryPool::new();
        pool.add(tx(1));
        pool.add(tx(2));
        let packaged: HashSet<u64> = pool.snapshot().iter().map(|e| e.seq).collect();

        // Arrives while the block is being mined
        pool.add(tx(3));

        assert_eq!(pool.remove_sequences(&packaged), 2);
        let left = pool.get_all();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].get_amount(), 3);
    }

    #[test]
    fn test_identical_transactions_are_distinct_entries() {
        let pool = MemoryPool::new();
        let first = pool.add(tx(5)).unwrap();
        pool.add(tx(5));

        let only_first: HashSet<u64> = [first].into_iter().collect();
        assert_eq!(pool.remove_sequences(&only_first), 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_purge_confirmed_by_id() {
        let pool = MemoryPool::new();
        pool.add(tx(1));
        pool.add(tx(2));
        let confirmed: HashSet<String> = [tx(1).id()].into_iter().collect();

        assert_eq!(pool.purge_confirmed(&confirmed), 1);
        assert!(!pool.contains(&tx(1).id()));
        assert!(pool.contains(&tx(2).id()));
    }
}
