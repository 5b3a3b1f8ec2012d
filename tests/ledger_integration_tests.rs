//! Ledger integration tests
//!
//! End-to-end behaviour across the public API: mining and rewards,
//! admission control, chain adoption between nodes, and the guarantees
//! that hold while mining runs concurrently with admission.

use pow_ledger::core::{MiningProgress, ProgressSink};
use pow_ledger::utils::rsa_pkcs1_sha256_verify;
use pow_ledger::{
    AdoptionOutcome, Blockchain, CancellationToken, KeyPair, LedgerConfig, LedgerError, Network,
    Node, Transaction, WalletRegistry, UNITS_PER_COIN,
};
use std::sync::{Arc, Mutex};

const ALICE_PKCS8: &[u8] = include_bytes!("fixtures/alice.pk8");
const BOB_PKCS8: &[u8] = include_bytes!("fixtures/bob.pk8");
const MINER_PKCS8: &[u8] = include_bytes!("fixtures/miner.pk8");
const ALICE_PAYLOAD_SIG: &[u8] = include_bytes!("fixtures/alice_payload.sig");

const COIN: u64 = UNITS_PER_COIN;

fn keys(pkcs8: &[u8]) -> KeyPair {
    KeyPair::from_pkcs8_der(pkcs8).unwrap()
}

fn fast_config() -> LedgerConfig {
    LedgerConfig {
        initial_difficulty: 1,
        min_difficulty: 1,
        max_difficulty: 2,
        ..LedgerConfig::default()
    }
}

struct Fixture {
    registry: WalletRegistry,
    miner: KeyPair,
    alice: KeyPair,
    bob: KeyPair,
}

fn fixture() -> Fixture {
    let registry = WalletRegistry::new();
    let miner = keys(MINER_PKCS8);
    let alice = keys(ALICE_PKCS8);
    let bob = keys(BOB_PKCS8);
    registry.register(miner.public_key(), "miner").unwrap();
    registry.register(alice.public_key(), "alice").unwrap();
    registry.register(bob.public_key(), "bob").unwrap();
    Fixture {
        registry,
        miner,
        alice,
        bob,
    }
}

fn mine(node: &Node, f: &Fixture) -> pow_ledger::Block {
    node.mine_block(&f.miner, &f.registry, &CancellationToken::new(), None)
        .unwrap()
        .expect("uncancelled mining always produces a block")
}

fn transfer(from: &KeyPair, to: &KeyPair, amount: u64, fee: u64) -> Transaction {
    Transaction::new(&from.address(), &to.address(), amount, fee)
        .signed(from)
        .unwrap()
}

#[test]
fn test_mine_at_difficulty_two_pays_reward() {
    let f = fixture();
    let config = LedgerConfig {
        initial_difficulty: 2,
        ..LedgerConfig::default()
    };
    let node = Node::new("A", config, None).unwrap();

    assert_eq!(node.chain().blocks()[0].get_prev_hash(), "0");
    let block = mine(&node, &f);

    assert!(block.get_hash().starts_with("00"));
    assert_eq!(block.get_difficulty(), 2);
    assert!(block.has_valid_proof());
    assert!(block.verify());
    assert!(node.is_valid());
    assert_eq!(node.balance_of(&f.miner.address()), 5 * COIN as i128);
}

#[test]
fn test_overspend_rejected_at_admission() {
    let f = fixture();
    let node = Node::new("A", fast_config(), None).unwrap();
    mine(&node, &f);
    node.admit(transfer(&f.miner, &f.alice, 4 * COIN, 0), &f.registry)
        .unwrap();
    mine(&node, &f);
    assert_eq!(node.balance_of(&f.alice.address()), 4 * COIN as i128);

    // amount 5, fee 0.5 against a balance of 4
    let overspend = transfer(&f.alice, &f.bob, 5 * COIN, COIN / 2);
    assert_eq!(
        node.admit(overspend, &f.registry),
        Err(LedgerError::InsufficientFunds {
            address: f.alice.address(),
            required: 5 * COIN + COIN / 2,
            available: 4 * COIN as i128,
        })
    );
    assert!(node.pending().is_empty());
}

#[test]
fn test_longer_valid_chain_is_adopted() {
    let f = fixture();
    let a = Node::new("A", fast_config(), None).unwrap();
    let b = Node::new("B", fast_config(), None).unwrap();
    for _ in 0..3 {
        mine(&a, &f);
    }
    for round in 0..5 {
        if round == 2 {
            b.admit(transfer(&f.miner, &f.alice, 2 * COIN, COIN / 10), &f.registry)
                .unwrap();
        }
        mine(&b, &f);
    }
    assert_eq!(a.chain().len(), 4);
    assert_eq!(b.chain().len(), 6);

    assert_eq!(
        a.try_adopt(&b.chain()),
        Ok(AdoptionOutcome::Adopted {
            length: 6,
            purged: 0
        })
    );
    assert_eq!(a.balances(false), b.chain().compute_balances(&[]));
    assert_eq!(a.chain(), b.chain());
}

#[test]
fn test_shorter_or_invalid_chain_leaves_receiver_untouched() {
    let f = fixture();
    let a = Node::new("A", fast_config(), None).unwrap();
    let b = Node::new("B", fast_config(), None).unwrap();
    for _ in 0..3 {
        mine(&a, &f);
    }
    mine(&b, &f);
    a.admit(transfer(&f.miner, &f.alice, COIN, 0), &f.registry)
        .unwrap();
    let chain_before = a.chain();
    let pending_before = a.pending();

    assert!(matches!(
        a.try_adopt(&b.chain()),
        Ok(AdoptionOutcome::NotLonger { .. })
    ));

    // Longer, but block 2 was re-mined with a forged prevHash
    let mut blocks = a.chain().blocks().to_vec();
    let mut extra = pow_ledger::Block::new_candidate(4, blocks[3].get_hash());
    extra.mine(1);
    extra.sign(&f.miner).unwrap();
    blocks.push(extra);
    let mut forged = pow_ledger::Block::new_candidate(2, "FORGED");
    forged.mine(1);
    forged.sign(&f.miner).unwrap();
    blocks[2] = forged;
    assert!(matches!(
        a.try_adopt(&Blockchain::from_blocks(blocks)),
        Err(LedgerError::ChainIntegrityViolation(_))
    ));

    assert_eq!(a.chain(), chain_before);
    assert_eq!(a.pending(), pending_before);
}

#[test]
fn test_tampered_history_from_json_is_refused() {
    let f = fixture();
    let source = Node::new("A", fast_config(), None).unwrap();
    let target = Node::new("B", fast_config(), None).unwrap();
    mine(&source, &f);
    source
        .admit(transfer(&f.miner, &f.alice, COIN, 0), &f.registry)
        .unwrap();
    mine(&source, &f);

    // Rewrite the transfer amount in transit
    let mut json = serde_json::to_value(source.chain().as_ref()).unwrap();
    json["blocks"][2]["transactions"][1]["amount"] = serde_json::json!(40 * COIN);
    let tampered: Blockchain = serde_json::from_value(json).unwrap();

    assert!(matches!(
        target.try_adopt(&tampered),
        Err(LedgerError::ChainIntegrityViolation(_))
    ));
    let report = tampered.validate_blocks();
    assert!(report[1].is_valid);
    assert!(!report[2].is_valid && !report[2].proof_valid);
    assert_eq!(target.height(), 0);
}

#[test]
fn test_adoption_purges_confirmed_pending_only() {
    let f = fixture();
    let a = Node::new("A", fast_config(), None).unwrap();
    let b = Node::new("B", fast_config(), None).unwrap();
    mine(&a, &f);
    b.try_adopt(&a.chain()).unwrap();

    let shared = transfer(&f.miner, &f.alice, COIN, 0);
    let local_only = transfer(&f.miner, &f.bob, COIN, 0);
    a.admit(shared.clone(), &f.registry).unwrap();
    b.admit(shared.clone(), &f.registry).unwrap();
    b.admit(local_only.clone(), &f.registry).unwrap();
    mine(&a, &f);

    assert_eq!(
        b.try_adopt(&a.chain()),
        Ok(AdoptionOutcome::Adopted {
            length: 3,
            purged: 1
        })
    );
    assert_eq!(b.pending(), vec![local_only]);
}

#[test]
fn test_broadcast_converges_network() {
    let f = fixture();
    let registry = Arc::new(f.registry);
    let network = Network::new(fast_config(), Arc::clone(&registry), None).unwrap();
    for id in ["A", "B", "C"] {
        network.add_node(id).unwrap();
    }
    let a = network.node("A").unwrap();
    let c = network.node("C").unwrap();
    for _ in 0..2 {
        a.mine_block(&f.miner, &registry, &CancellationToken::new(), None)
            .unwrap();
    }
    // C is ahead of nobody but has its own fork of length 2
    c.mine_block(&f.miner, &registry, &CancellationToken::new(), None)
        .unwrap();

    let results = network.broadcast("A").unwrap();
    assert_eq!(results.len(), 2);
    for id in network.node_ids() {
        let node = network.node(&id).unwrap();
        assert_eq!(node.chain(), a.chain(), "node {id} did not converge");
        assert!(node.is_valid());
    }
}

// Admits one more transaction the moment a hash is found, i.e. after the
// block's contents were fixed but before it is appended
struct AdmitOnFound<'a> {
    node: &'a Node,
    registry: &'a WalletRegistry,
    late: Mutex<Option<Transaction>>,
}

impl ProgressSink for AdmitOnFound<'_> {
    fn report(&self, event: MiningProgress) {
        if let MiningProgress::Found { .. } = event {
            if let Some(tx) = self.late.lock().unwrap().take() {
                self.node.admit(tx, self.registry).unwrap();
            }
        }
    }
}

#[test]
fn test_transaction_admitted_during_mining_stays_pending() {
    let f = fixture();
    let node = Node::new("A", fast_config(), None).unwrap();
    mine(&node, &f);
    let packaged = transfer(&f.miner, &f.alice, COIN, 0);
    let late = transfer(&f.miner, &f.bob, COIN, 0);
    node.admit(packaged.clone(), &f.registry).unwrap();

    let sink = AdmitOnFound {
        node: &node,
        registry: &f.registry,
        late: Mutex::new(Some(late.clone())),
    };
    let block = node
        .mine_block(&f.miner, &f.registry, &CancellationToken::new(), Some(&sink as &dyn ProgressSink))
        .unwrap()
        .unwrap();

    assert_eq!(block.get_transactions()[1..], [packaged]);
    assert_eq!(node.pending(), vec![late]);
}

// Replaces the node's chain while the block is being mined
struct AdoptOnFound<'a> {
    node: &'a Node,
    longer: Blockchain,
}

impl ProgressSink for AdoptOnFound<'_> {
    fn report(&self, event: MiningProgress) {
        if let MiningProgress::Found { .. } = event {
            self.node.try_adopt(&self.longer).unwrap();
        }
    }
}

#[test]
fn test_append_after_concurrent_adoption_is_position_conflict() {
    let f = fixture();
    let a = Node::new("A", fast_config(), None).unwrap();
    let b = Node::new("B", fast_config(), None).unwrap();
    mine(&b, &f);
    mine(&b, &f);

    let sink = AdoptOnFound {
        node: &a,
        longer: b.chain().as_ref().clone(),
    };
    let result = a.mine_block(&f.miner, &f.registry, &CancellationToken::new(), Some(&sink as &dyn ProgressSink));

    assert_eq!(result, Err(LedgerError::BlockPositionConflict { index: 1 }));
    assert_eq!(a.chain(), b.chain());
    assert!(a.is_valid());
}

#[test]
fn test_concurrent_admission_and_mining_lose_nothing() {
    let f = fixture();
    let node = Node::new("A", fast_config(), None).unwrap();
    for _ in 0..3 {
        mine(&node, &f);
    }

    let admitted: Vec<Transaction> = std::thread::scope(|scope| {
        let submitter = scope.spawn(|| {
            let mut admitted = Vec::new();
            for amount in 1..=20u64 {
                let tx = transfer(&f.miner, &f.alice, amount, 1);
                node.admit(tx.clone(), &f.registry).unwrap();
                admitted.push(tx);
            }
            admitted
        });
        for _ in 0..4 {
            mine(&node, &f);
        }
        submitter.join().unwrap()
    });
    // One more round picks up anything still pending
    mine(&node, &f);

    let chain = node.chain();
    let confirmed = chain.transaction_ids();
    assert!(admitted.iter().all(|tx| confirmed.contains(&tx.id())));
    assert!(node.pending().is_empty());
    assert!(chain.is_valid());
    let received: u64 = (1..=20).sum();
    assert_eq!(node.balance_of(&f.alice.address()), received as i128);
}

#[test]
fn test_cancelled_mining_appends_nothing() {
    let f = fixture();
    let config = LedgerConfig {
        initial_difficulty: 5,
        ..LedgerConfig::default()
    };
    let node = Node::new("A", config, None).unwrap();
    let cancel = CancellationToken::new();
    let remote = cancel.clone();

    let outcome = std::thread::scope(|scope| {
        let miner = scope.spawn(|| node.mine_block(&f.miner, &f.registry, &cancel, None));
        remote.cancel();
        miner.join().unwrap()
    });

    // Either cancelled outright or it got lucky first; never partial
    match outcome.unwrap() {
        None => assert_eq!(node.height(), 0),
        Some(block) => assert_eq!(node.chain().tip(), Some(&block)),
    }
    assert!(node.is_valid());
}

#[test]
fn test_signature_matches_openssl() {
    let alice = keys(ALICE_PKCS8);
    let payload = Transaction::coinbase(&alice.address(), 5 * COIN).canonical_payload();
    assert_eq!(
        payload,
        "COINBASE|ADDR_5322C1F32355640294DBE65258EDD2FF2C13B694|5.00000000|0.00000000"
    );

    assert!(rsa_pkcs1_sha256_verify(
        alice.public_key(),
        ALICE_PAYLOAD_SIG,
        payload.as_bytes()
    ));
    // PKCS#1 v1.5 is deterministic, so ring reproduces the OpenSSL bytes
    assert_eq!(alice.sign(payload.as_bytes()).unwrap(), ALICE_PAYLOAD_SIG);
}

#[test]
fn test_unregistered_miner_and_unknown_sender() {
    let f = fixture();
    let node = Node::new("A", fast_config(), None).unwrap();
    let empty = WalletRegistry::new();

    assert_eq!(
        node.mine_block(&f.miner, &empty, &CancellationToken::new(), None),
        Err(LedgerError::UnregisteredMiner)
    );
    assert!(matches!(
        node.admit(transfer(&f.alice, &f.bob, 1, 0), &empty),
        Err(LedgerError::UnknownSender(_))
    ));
    assert_eq!(node.height(), 0);
}
