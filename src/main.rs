// This is my main entry point for the ledger demo CLI
use clap::Parser;
use log::{debug, error, info, LevelFilter};
use pow_ledger::core::monetary::format_balance;
use pow_ledger::storage::ChainStore;
use pow_ledger::utils::base64_decode;
use pow_ledger::{
    format_amount, Blockchain, CancellationToken, Command, KeyPair, LedgerConfig, LedgerError,
    MiningProgress, Network, Node, Opt, ProgressSink, SledStore, Transaction, WalletRegistry, GLOBAL_CONFIG,
    UNITS_PER_COIN,
};
use std::path::Path;
use std::process;
use std::sync::{mpsc, Arc};
use std::thread;

// Every simulated transfer moves one coin and pays a tenth of a coin in fees
const TRANSFER_AMOUNT: u64 = UNITS_PER_COIN;
const TRANSFER_FEE: u64 = UNITS_PER_COIN / 10;

fn main() {
    // Info by default; RUST_LOG still wins when set
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        // I derive the address straight from the key file
        Command::Address { key } => {
            let key = KeyPair::from_file(&key)?;
            println!("{}", key.address());
        }
        Command::Simulate {
            nodes,
            blocks,
            difficulty,
            config,
            policy,
            miner_key,
            keys,
            db,
        } => {
            let mut config = match config {
                Some(path) => LedgerConfig::load(&path)?,
                None => GLOBAL_CONFIG.clone(),
            };
            if let Some(difficulty) = difficulty {
                config.initial_difficulty = difficulty;
                config.max_difficulty = config.max_difficulty.max(difficulty);
            }
            if let Some(policy) = policy {
                config.admission_policy = policy;
            }
            config.validate()?;

            let store: Option<Arc<dyn ChainStore>> = match db {
                Some(path) => Some(Arc::new(SledStore::open(path)?)),
                None => None,
            };
            simulate(config, store, nodes, blocks, &miner_key, &keys)?;
        }
        // I load the stored chain as-is and show where it stops being valid
        Command::Verify { db, node, json } => {
            let store = SledStore::open(&db)?;
            let blocks = store
                .load_chain(&node)?
                .ok_or_else(|| LedgerError::UnknownNode(node.clone()))?;
            let chain = Blockchain::from_blocks(blocks);
            if json {
                println!("{}", chain.validation_report_json()?);
            } else {
                print_chain_report(&chain);
            }
        }
        // Manual recovery only: the rewritten block usually fails validation
        Command::Repair {
            db,
            node,
            index,
            signature,
        } => {
            let store: Arc<dyn ChainStore> = Arc::new(SledStore::open(&db)?);
            if store.load_chain(&node)?.is_none() {
                return Err(LedgerError::UnknownNode(node).into());
            }
            let signature = signature.as_deref().map(base64_decode).transpose()?;
            let node = Node::new(&node, GLOBAL_CONFIG.clone(), Some(store))?;
            let block = node.repair_block(index, signature)?;
            println!("Block {index} now has hash {}", block.get_hash());
            print_chain_report(&node.chain());
        }
    }
    Ok(())
}

fn node_name(position: usize) -> String {
    match u8::try_from(position) {
        Ok(offset) if offset < 26 => char::from(b'A' + offset).to_string(),
        _ => format!("N{position}"),
    }
}

fn simulate(
    config: LedgerConfig,
    store: Option<Arc<dyn ChainStore>>,
    node_count: usize,
    block_count: usize,
    miner_key: &Path,
    wallet_keys: &[std::path::PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    if node_count == 0 {
        return Err("simulate needs at least one node".into());
    }

    let registry = Arc::new(WalletRegistry::new());
    let miner = KeyPair::from_file(miner_key)?;
    registry.register(miner.public_key(), "miner")?;
    let mut recipients = Vec::new();
    for (position, path) in wallet_keys.iter().enumerate() {
        let key = KeyPair::from_file(path)?;
        let wallet = registry.register(key.public_key(), &format!("wallet-{position}"))?;
        recipients.push(wallet.get_address().to_string());
    }

    let network = Network::new(config, Arc::clone(&registry), store)?;
    for position in 0..node_count {
        network.add_node(&node_name(position))?;
    }
    let source = network.node(&node_name(0))?;

    // Progress events are drained on their own thread so mining never waits on output
    let (sender, receiver) = mpsc::channel::<MiningProgress>();
    let reporter = thread::spawn(move || {
        for event in receiver {
            match event {
                MiningProgress::Rate {
                    attempts_per_second,
                } => debug!("Hashing at {attempts_per_second} attempts/s"),
                MiningProgress::Found {
                    attempts,
                    duration_ms,
                    ..
                } => info!("Found a hash after {attempts} attempts in {duration_ms} ms"),
                other => debug!("{other:?}"),
            }
        }
    });

    let cancel = CancellationToken::new();
    for round in 0..block_count {
        if let Some(recipient) = recipients.get(round % recipients.len().max(1)) {
            let spendable = source.balance_of(&miner.address());
            if spendable >= (TRANSFER_AMOUNT + TRANSFER_FEE) as i128 {
                let tx = Transaction::new(&miner.address(), recipient, TRANSFER_AMOUNT, TRANSFER_FEE)
                    .signed(&miner)?;
                source.admit(tx, &registry)?;
            }
        }
        match source.mine_block(&miner, &registry, &cancel, Some(&sender as &dyn ProgressSink))? {
            Some(block) => println!(
                "Mined block {} at difficulty {} in {} ms: {}",
                block.get_index(),
                block.get_difficulty(),
                block.get_mining_duration_ms(),
                block.get_hash()
            ),
            None => break,
        }
    }
    drop(sender);
    if reporter.join().is_err() {
        error!("Progress reporter thread panicked");
    }

    for result in network.broadcast(source.id())? {
        match result.outcome {
            Ok(outcome) => println!("{}: {outcome:?}", result.node_id),
            Err(e) => println!("{}: rejected ({e})", result.node_id),
        }
    }

    println!();
    for id in network.node_ids() {
        let node = network.node(&id)?;
        println!(
            "Node {id}: height {}, next difficulty {}, pending {}, valid {}",
            node.height(),
            node.difficulty(),
            node.pending_count(),
            node.is_valid()
        );
        let mut balances: Vec<(String, i128)> = node.balances(false).into_iter().collect();
        balances.sort();
        for (address, balance) in balances {
            println!("  {address}: {}", format_balance(balance));
        }
    }
    println!(
        "Reward for the next block: {}",
        format_amount(pow_ledger::block_reward(
            network.config().base_reward,
            network.config().halving_interval,
            source.chain().next_index()
        ))
    );
    Ok(())
}

fn print_chain_report(chain: &Blockchain) {
    for view in chain.validate_blocks() {
        println!(
            "#{:<4} {} linked={} proof={} signature={} valid={}",
            view.index, view.hash, view.linked, view.proof_valid, view.signature_valid, view.is_valid
        );
    }
    match chain.verify() {
        Ok(()) => println!("Chain is valid ({} blocks)", chain.len()),
        Err(e) => println!("Chain is invalid: {e}"),
    }
}
