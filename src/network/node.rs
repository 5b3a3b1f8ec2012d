use crate::config::{AdmissionPolicy, LedgerConfig};
use crate::core::repair::rewrite_block;
use crate::core::{
    block_reward, Balances, Block, BlockValidation, Blockchain, CancellationToken,
    DifficultyAdjustment, MiningControl, ProgressSink, Transaction,
};
use crate::error::{LedgerError, Result};
use crate::storage::{ChainStore, MemoryPool};
use crate::wallet::{KeyPair, WalletRegistry};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Result of offering a chain to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdoptionOutcome {
    /// The offered chain replaced ours; `purged` pending transactions were
    /// already confirmed in it
    Adopted { length: usize, purged: usize },
    /// Not strictly longer than the local chain; nothing changed
    NotLonger { local: usize, offered: usize },
}

/// An entry in an address's history. `block_index` is `None` while pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub block_index: Option<u64>,
    pub transaction: Transaction,
}

struct ChainState {
    chain: Arc<Blockchain>,
    difficulty: u32,
}

/// One independent ledger replica.
///
/// The chain sits behind a single per-node lock and is only ever replaced
/// whole (append and adoption both build a new [`Blockchain`] and swap the
/// `Arc`). Readers clone the `Arc` and work on that snapshot. Mining hashes
/// outside the lock and only takes the write lock to append. Admissions
/// are serialised among themselves so each balance check sees every earlier
/// admitted transaction.
pub struct Node {
    id: String,
    config: LedgerConfig,
    state: RwLock<ChainState>,
    admission: Mutex<()>,
    mempool: MemoryPool,
    store: Option<Arc<dyn ChainStore>>,
}

impl Node {
    /// Load `id`'s chain from `store`, or start from genesis if it has none
    pub fn new(id: &str, config: LedgerConfig, store: Option<Arc<dyn ChainStore>>) -> Result<Node> {
        config.validate()?;

        let chain = match store.as_ref() {
            Some(store) => match store.load_chain(id)? {
                Some(blocks) => {
                    let chain = Blockchain::from_blocks(blocks);
                    if let Err(e) = chain.verify() {
                        warn!("Node {id} loaded a chain that does not verify: {e}");
                    }
                    chain
                }
                None => {
                    let chain = Blockchain::new();
                    store.replace_chain(id, chain.blocks())?;
                    chain
                }
            },
            None => Blockchain::new(),
        };

        let difficulty = Self::difficulty_for(&chain, &config);
        info!(
            "Node {id} ready at height {} with difficulty {difficulty}",
            chain.len().saturating_sub(1)
        );
        Ok(Node {
            id: id.to_string(),
            config,
            state: RwLock::new(ChainState {
                chain: Arc::new(chain),
                difficulty,
            }),
            admission: Mutex::new(()),
            mempool: MemoryPool::new(),
            store,
        })
    }

    /// Difficulty a node holding `chain` mines its next block at: the tip's
    /// difficulty carried through one retarget step
    fn difficulty_for(chain: &Blockchain, config: &LedgerConfig) -> u32 {
        let current = match chain.tip() {
            Some(tip) if !tip.is_genesis() => tip.get_difficulty(),
            _ => config.initial_difficulty,
        };
        DifficultyAdjustment::calculate_next_difficulty(chain.blocks(), current, config)
    }

    // The state is only ever replaced whole, so a poisoned guard still holds
    // a consistent chain.
    fn read_state(&self) -> RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Admit a signed transaction into the mempool and return its id.
    ///
    /// Checks run in order: the sender must be registered, the signature
    /// must verify with the registered key, and the sender's balance (per
    /// the configured [`AdmissionPolicy`]) must cover `amount + fee`. A
    /// rejected transaction leaves the node untouched.
    pub fn admit(&self, tx: Transaction, registry: &WalletRegistry) -> Result<String> {
        let sender = tx.get_from_address().to_string();
        let public_key = registry.public_key_of(&sender).ok_or_else(|| {
            debug!("Node {} rejected transaction from unknown sender {sender}", self.id);
            LedgerError::UnknownSender(sender.clone())
        })?;

        if !tx.verify_signature(&public_key) {
            warn!("Node {} rejected transaction from {sender}: bad signature", self.id);
            return Err(LedgerError::InvalidSignature(format!(
                "Transaction from {sender} does not verify"
            )));
        }

        // Both held until the push: the admission lock so two admitters can't
        // pass the same overlay, the state lock so an adoption can't land
        // between the balance check and the insert
        let admitting = self.admission.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self.read_state();
        let overlay = match self.config.admission_policy {
            AdmissionPolicy::ConfirmedOnly => Vec::new(),
            AdmissionPolicy::IncludePending => self.mempool.get_all(),
        };
        let available = state
            .chain
            .compute_balances(&overlay)
            .get(&sender)
            .copied()
            .unwrap_or(0);
        let required = tx.total_debit();
        if available < required as i128 {
            warn!(
                "Node {} rejected transaction from {sender}: needs {required}, has {available}",
                self.id
            );
            return Err(LedgerError::InsufficientFunds {
                address: sender,
                required: u64::try_from(required).unwrap_or(u64::MAX),
                available,
            });
        }

        let txid = tx.id();
        self.mempool
            .add(tx)
            .ok_or_else(|| LedgerError::Database("Memory pool unavailable".to_string()))?;
        drop(state);
        drop(admitting);

        info!("Node {} admitted transaction {txid}", self.id);
        Ok(txid)
    }

    /// Package every pending transaction behind a coinbase paying the block
    /// reward plus their fees, mine it, sign it and append it.
    ///
    /// Returns `Ok(None)` if `cancel` fired first; nothing is appended and the
    /// mempool is unchanged. Transactions admitted while hashing stay pending
    /// for the next round.
    pub fn mine_block(
        &self,
        miner: &KeyPair,
        registry: &WalletRegistry,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<Option<Block>> {
        let wallet = registry
            .find_by_public_key(miner.public_key())
            .ok_or(LedgerError::UnregisteredMiner)?;

        let (chain, difficulty) = self.snapshot();
        let pending = self.mempool.snapshot();
        let index = chain.next_index();

        let reward = block_reward(self.config.base_reward, self.config.halving_interval, index);
        let fees = pending
            .iter()
            .fold(0u64, |total, entry| total.saturating_add(entry.tx.get_fee()));
        let mut transactions = Vec::with_capacity(pending.len() + 1);
        transactions.push(Transaction::coinbase(wallet.get_address(), reward.saturating_add(fees)));
        transactions.extend(pending.iter().map(|entry| entry.tx.clone()));
        let packaged: HashSet<u64> = pending.iter().map(|entry| entry.seq).collect();

        self.mine_on(&chain, difficulty, transactions, &packaged, miner, cancel, progress)
    }

    /// Mine and sign a block with no transactions and no reward on top of the
    /// current tip. The mempool is left alone.
    pub fn mine_empty_block(
        &self,
        miner: &KeyPair,
        cancel: &CancellationToken,
    ) -> Result<Option<Block>> {
        let (chain, difficulty) = self.snapshot();
        self.mine_on(&chain, difficulty, Vec::new(), &HashSet::new(), miner, cancel, None)
    }

    #[allow(clippy::too_many_arguments)]
    fn mine_on(
        &self,
        chain: &Blockchain,
        difficulty: u32,
        transactions: Vec<Transaction>,
        packaged: &HashSet<u64>,
        miner: &KeyPair,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<Option<Block>> {
        let tip_hash = chain.tip().map(Block::get_hash).ok_or_else(|| {
            LedgerError::ChainIntegrityViolation(format!("Node {} has an empty chain", self.id))
        })?;
        let mut block = Block::new_candidate(chain.next_index(), tip_hash);
        block.set_transactions(transactions);

        let mut control = MiningControl::new(cancel).with_intervals(
            self.config.progress_interval,
            self.config.cancel_check_interval,
        );
        if let Some(sink) = progress {
            control = control.with_progress(sink);
        }

        info!(
            "Node {} mining block {} at difficulty {difficulty} with {} transactions",
            self.id,
            block.get_index(),
            block.tx_count()
        );
        if !block.mine_with(difficulty, &control) {
            info!("Node {} mining of block {} cancelled", self.id, block.get_index());
            return Ok(None);
        }
        block.sign(miner)?;

        self.append_mined(block.clone(), packaged)?;
        info!(
            "Node {} appended block {} ({})",
            self.id,
            block.get_index(),
            block.get_hash()
        );
        Ok(Some(block))
    }

    fn append_mined(&self, block: Block, packaged: &HashSet<u64>) -> Result<()> {
        let mut state = self.write_state();
        // Fails with BlockPositionConflict if the tip moved while we hashed
        let extended = state.chain.with_block(block.clone())?;
        if let Some(store) = &self.store {
            store.append_block(&self.id, &block)?;
        }

        let removed = self.mempool.remove_sequences(packaged);
        debug!("Node {} cleared {removed} packaged transactions", self.id);
        state.difficulty =
            DifficultyAdjustment::calculate_next_difficulty(extended.blocks(), state.difficulty, &self.config);
        state.chain = Arc::new(extended);
        Ok(())
    }

    /// Offer `incoming` under the longest-chain rule.
    ///
    /// Anything not strictly longer is declined with
    /// [`AdoptionOutcome::NotLonger`]. A longer chain is fully re-verified;
    /// a failure is returned as the error and leaves the node untouched.
    /// On success the node holds its own deep copy of the chain and its
    /// mempool drops every transaction the new chain confirms.
    pub fn try_adopt(&self, incoming: &Blockchain) -> Result<AdoptionOutcome> {
        let local = self.height_len();
        if incoming.len() <= local {
            debug!(
                "Node {} kept its chain: offered {} blocks, has {local}",
                self.id,
                incoming.len()
            );
            return Ok(AdoptionOutcome::NotLonger {
                local,
                offered: incoming.len(),
            });
        }

        if let Err(e) = incoming.verify() {
            warn!("Node {} rejected offered chain: {e}", self.id);
            return Err(e);
        }

        let adopted = incoming.clone();
        let mut state = self.write_state();
        // Re-check: the local chain may have grown while we verified
        let local = state.chain.len();
        if adopted.len() <= local {
            return Ok(AdoptionOutcome::NotLonger {
                local,
                offered: adopted.len(),
            });
        }
        if let Some(store) = &self.store {
            store.replace_chain(&self.id, adopted.blocks())?;
        }

        let purged = self.mempool.purge_confirmed(&adopted.transaction_ids());
        let length = adopted.len();
        state.difficulty = Self::difficulty_for(&adopted, &self.config);
        state.chain = Arc::new(adopted);
        info!(
            "Node {} adopted chain of {length} blocks (was {local}), purged {purged} pending",
            self.id
        );
        Ok(AdoptionOutcome::Adopted { length, purged })
    }

    /// Out-of-band repair: rewrite block `index` with an optional new
    /// signature and a recomputed hash. The result is persisted as-is and
    /// will usually fail validation from that block on.
    pub fn repair_block(&self, index: u64, signature: Option<Vec<u8>>) -> Result<Block> {
        let mut state = self.write_state();
        let repaired = rewrite_block(&state.chain, index, signature)?;
        if let Some(store) = &self.store {
            store.replace_chain(&self.id, repaired.blocks())?;
        }
        let block = repaired
            .get_block(index)
            .cloned()
            .ok_or_else(|| LedgerError::ChainIntegrityViolation(format!("No block at index {index}")))?;
        state.chain = Arc::new(repaired);
        warn!("Node {} repaired block {index}", self.id);
        Ok(block)
    }

    fn snapshot(&self) -> (Arc<Blockchain>, u32) {
        let state = self.read_state();
        (Arc::clone(&state.chain), state.difficulty)
    }

    fn height_len(&self) -> usize {
        self.read_state().chain.len()
    }

    /// Consistent snapshot of the current chain
    pub fn chain(&self) -> Arc<Blockchain> {
        Arc::clone(&self.read_state().chain)
    }

    /// Index of the tip block (0 for a genesis-only chain)
    pub fn height(&self) -> u64 {
        self.height_len().saturating_sub(1) as u64
    }

    /// Difficulty the next block will be mined at
    pub fn difficulty(&self) -> u32 {
        self.read_state().difficulty
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.mempool.get_all()
    }

    pub fn pending_count(&self) -> usize {
        self.mempool.len()
    }

    /// Balance table by full replay, optionally with pending transactions
    /// applied on top
    pub fn balances(&self, include_pending: bool) -> Balances {
        let chain = self.chain();
        if include_pending {
            chain.compute_balances(&self.mempool.get_all())
        } else {
            chain.compute_balances(&[])
        }
    }

    /// Confirmed balance of `address`
    pub fn balance_of(&self, address: &str) -> i128 {
        self.chain().balance_of(address)
    }

    pub fn is_valid(&self) -> bool {
        self.chain().is_valid()
    }

    pub fn validated_blocks(&self) -> Vec<BlockValidation> {
        self.chain().validate_blocks()
    }

    pub fn signature_report(&self) -> Vec<(u64, bool)> {
        self.chain().signature_report()
    }

    /// Pending transactions touching `address` first, then confirmed ones
    /// newest block first
    pub fn transactions_for(&self, address: &str) -> Vec<HistoryEntry> {
        let pending = self
            .mempool
            .get_all()
            .into_iter()
            .rev()
            .filter(|tx| tx.get_from_address() == address || tx.get_to_address() == address)
            .map(|transaction| HistoryEntry {
                block_index: None,
                transaction,
            });
        let confirmed = self
            .chain()
            .transactions_for(address)
            .into_iter()
            .map(|(index, transaction)| HistoryEntry {
                block_index: Some(index),
                transaction,
            });
        pending.chain(confirmed).collect()
    }
}
