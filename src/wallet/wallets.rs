use crate::error::{LedgerError, Result};
use crate::wallet::Wallet;
use log::{error, info};
use std::collections::HashMap;
use std::sync::RwLock;

/// Address -> wallet map owned by the service layer and passed explicitly
/// into admission and mining.
pub struct WalletRegistry {
    wallets: RwLock<HashMap<String, Wallet>>,
}

impl Default for WalletRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletRegistry {
    pub fn new() -> WalletRegistry {
        WalletRegistry {
            wallets: RwLock::new(HashMap::new()),
        }
    }

    /// Register a public key. Re-registering the same key replaces the
    /// display name; the address never changes.
    pub fn register(&self, public_key: &[u8], display_name: &str) -> Result<Wallet> {
        let wallet = Wallet::new(public_key, display_name)?;
        match self.wallets.write() {
            Ok(mut wallets) => {
                wallets.insert(wallet.get_address().to_string(), wallet.clone());
                info!("Registered wallet {} ({display_name})", wallet.get_address());
            }
            Err(_) => {
                error!("Failed to acquire write lock on wallet registry");
                return Err(LedgerError::Database(
                    "Wallet registry unavailable".to_string(),
                ));
            }
        }
        Ok(wallet)
    }

    pub fn get_wallet(&self, address: &str) -> Option<Wallet> {
        match self.wallets.read() {
            Ok(wallets) => wallets.get(address).cloned(),
            Err(_) => {
                error!("Failed to acquire read lock on wallet registry");
                None
            }
        }
    }

    /// Public key registered under `address`
    pub fn public_key_of(&self, address: &str) -> Option<Vec<u8>> {
        self.get_wallet(address)
            .map(|wallet| wallet.get_public_key().to_vec())
    }

    /// Reverse lookup used to resolve a miner from its key
    pub fn find_by_public_key(&self, public_key: &[u8]) -> Option<Wallet> {
        match self.wallets.read() {
            Ok(wallets) => wallets
                .values()
                .find(|wallet| wallet.get_public_key() == public_key)
                .cloned(),
            Err(_) => {
                error!("Failed to acquire read lock on wallet registry");
                None
            }
        }
    }

    pub fn get_addresses(&self) -> Vec<String> {
        match self.wallets.read() {
            Ok(wallets) => {
                let mut addresses: Vec<String> = wallets.keys().cloned().collect();
                addresses.sort();
                addresses
            }
            Err(_) => {
                error!("Failed to acquire read lock on wallet registry");
                Vec::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.wallets.read() {
            Ok(wallets) => wallets.len(),
            Err(_) => {
                error!("Failed to acquire read lock on wallet registry");
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
    use crate::testnet::{alice_keys, bob_keys, carol_keys};

    #[test]
    fn test_register_and_lookup() {
        let registry = WalletRegistry::new();
        let alice = alice_keys();
        let wallet = registry.register(alice.public_key(), "Alice").unwrap();

        assert_eq!(wallet.get_address(), alice.address());
        assert_eq!(
            registry.public_key_of(&alice.address()).as_deref(),
            Some(alice.public_key())
        );
        assert!(registry.get_wallet(&bob_keys().address()).is_none());
    }

    #[test]
    fn test_reverse_lookup_by_public_key() {
        let registry = WalletRegistry::new();
        let alice = alice_keys();
        let bob = bob_keys();
        registry.register(alice.public_key(), "Alice").unwrap();

        let found = registry.find_by_public_key(alice.public_key()).unwrap();
        assert_eq!(found.get_address(), alice.address());
        assert!(registry.find_by_public_key(bob.public_key()).is_none());
    }

    #[test]
    fn test_reregistering_keeps_single_entry() {
        let registry = WalletRegistry::new();
        let alice = alice_keys();
        registry.register(alice.public_key(), "Alice").unwrap();
        registry.register(alice.public_key(), "Alice (laptop)").unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry
                .get_wallet(&alice.address())
                .unwrap()
                .get_display_name(),
            "Alice (laptop)"
        );
    }

    #[test]
    fn test_addresses_sorted() {
        let registry = WalletRegistry::new();
        for key in [carol_keys(), alice_keys(), bob_keys()] {
            registry.register(key.public_key(), "someone").unwrap();
        }

        let addresses = registry.get_addresses();
        assert_eq!(addresses.len(), 3);
        assert!(addresses.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(addresses.contains(&carol_keys().address()));
    }

    #[test]
    fn test_register_fails_on_poisoned_registry() {
        let registry = WalletRegistry::new();
        let _ = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = registry.wallets.write().unwrap();
                    panic!("poison the registry lock");
                })
                .join()
        });

        assert!(matches!(
            registry.register(alice_keys().public_key(), "Alice"),
            Err(LedgerError::Database(_))
        ));
    }
}
