//! Test utilities for ledger testing

use crate::config::LedgerConfig;
use crate::core::{Block, Blockchain, Transaction};
use crate::wallet::KeyPair;

// ring can load RSA keys but not generate them, so tests use fixed
// RSA-2048 PKCS#8 fixtures
pub const ALICE_PKCS8: &[u8] = include_bytes!("../../tests/fixtures/alice.pk8");
pub const BOB_PKCS8: &[u8] = include_bytes!("../../tests/fixtures/bob.pk8");
pub const CAROL_PKCS8: &[u8] = include_bytes!("../../tests/fixtures/carol.pk8");
pub const MINER_PKCS8: &[u8] = include_bytes!("../../tests/fixtures/miner.pk8");
pub const ALICE_PEM: &str = include_str!("../../tests/fixtures/alice.pem");

pub fn alice_keys() -> KeyPair {
    KeyPair::from_pkcs8_der(ALICE_PKCS8).expect("alice fixture should parse")
}

pub fn bob_keys() -> KeyPair {
    KeyPair::from_pkcs8_der(BOB_PKCS8).expect("bob fixture should parse")
}

pub fn carol_keys() -> KeyPair {
    KeyPair::from_pkcs8_der(CAROL_PKCS8).expect("carol fixture should parse")
}

pub fn miner_keys() -> KeyPair {
    KeyPair::from_pkcs8_der(MINER_PKCS8).expect("miner fixture should parse")
}

/// Default parameters with difficulty held low so tests mine instantly
pub fn test_config() -> LedgerConfig {
    LedgerConfig {
        initial_difficulty: 1,
        min_difficulty: 1,
        max_difficulty: 2,
        ..LedgerConfig::default()
    }
}

/// Mine and sign the next block of `chain` at difficulty 1
pub fn mine_test_block(chain: &Blockchain, transactions: Vec<Transaction>, signer: &KeyPair) -> Block {
    let tip = chain.tip().expect("test chain should have a genesis block");
    let mut block = Block::new_candidate(chain.next_index(), tip.get_hash());
    block.set_transactions(transactions);
    block.mine(1);
    block.sign(signer).expect("signing with a fixture key should work");
    block
}

/// Genesis followed by one linked block per entry, each recording that
/// mining time. Blocks are not mined; only the durations matter.
pub fn chain_with_durations(durations_ms: &[u64]) -> Vec<Block> {
    let mut blocks = vec![Block::genesis()];
    for (offset, duration) in durations_ms.iter().enumerate() {
        let prev_hash = blocks[offset].get_hash().to_string();
        let block = Block::new(offset as u64 + 1, prev_hash, 1_735_689_600_000 + offset as i64)
            .with_mining_duration(*duration);
        blocks.push(block);
    }
    blocks
}
