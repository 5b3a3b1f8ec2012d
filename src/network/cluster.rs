use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::network::{AdoptionOutcome, Node};
use crate::storage::ChainStore;
use crate::wallet::WalletRegistry;
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// What one peer did with a broadcast chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResult {
    pub node_id: String,
    pub outcome: Result<AdoptionOutcome>,
}

/// A set of independent nodes sharing a wallet registry.
///
/// Replication is a trusted synchronous broadcast: the source chain is
/// offered to every other node, each of which applies the longest-chain
/// rule on its own.
pub struct Network {
    config: LedgerConfig,
    registry: Arc<WalletRegistry>,
    store: Option<Arc<dyn ChainStore>>,
    nodes: RwLock<BTreeMap<String, Arc<Node>>>,
}

impl Network {
    pub fn new(
        config: LedgerConfig,
        registry: Arc<WalletRegistry>,
        store: Option<Arc<dyn ChainStore>>,
    ) -> Result<Network> {
        config.validate()?;
        Ok(Network {
            config,
            registry,
            store,
            nodes: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn registry(&self) -> &WalletRegistry {
        &self.registry
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Start (or load from the store) the node called `id`. Adding an
    /// existing id returns the running node.
    pub fn add_node(&self, id: &str) -> Result<Arc<Node>> {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(node) = nodes.get(id) {
            return Ok(Arc::clone(node));
        }
        let node = Arc::new(Node::new(id, self.config.clone(), self.store.clone())?);
        nodes.insert(id.to_string(), Arc::clone(&node));
        info!("Added node {id}");
        Ok(node)
    }

    pub fn node(&self, id: &str) -> Result<Arc<Node>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownNode(id.to_string()))
    }

    /// Known node ids in sorted order
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Offer `source_id`'s current chain to every other node.
    ///
    /// Each peer decides independently; a rejection is recorded in its
    /// result and never affects the others.
    pub fn broadcast(&self, source_id: &str) -> Result<Vec<BroadcastResult>> {
        let source = self.node(source_id)?;
        let chain = source.chain();
        let peers: Vec<Arc<Node>> = self
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| id.as_str() != source_id)
            .map(|(_, node)| Arc::clone(node))
            .collect();

        info!(
            "Broadcasting chain of {} blocks from {source_id} to {} peers",
            chain.len(),
            peers.len()
        );
        let results = peers
            .iter()
            .map(|peer| {
                let outcome = peer.try_adopt(&chain);
                if let Err(e) = &outcome {
                    warn!("Node {} refused chain from {source_id}: {e}", peer.id());
                }
                BroadcastResult {
                    node_id: peer.id().to_string(),
                    outcome,
                }
            })
            .collect();
        Ok(results)
    }
}
