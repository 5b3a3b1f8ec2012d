use crate::config::AdmissionPolicy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pow-ledger")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "address", about = "Print the address of an RSA key")]
    Address {
        #[arg(long, help = "PKCS#8 private key file (PEM or DER)")]
        key: PathBuf,
    },
    #[command(
        name = "simulate",
        about = "Mine on one node of a local network and broadcast the result"
    )]
    Simulate {
        #[arg(long, default_value_t = 3, help = "Number of nodes")]
        nodes: usize,
        #[arg(long, default_value_t = 3, help = "Blocks to mine on the first node")]
        blocks: usize,
        #[arg(long, help = "Starting difficulty (overrides the config)")]
        difficulty: Option<u32>,
        #[arg(long, help = "TOML config file")]
        config: Option<PathBuf>,
        #[arg(
            long,
            help = "Admission policy (confirmed-only, include-pending)"
        )]
        policy: Option<AdmissionPolicy>,
        #[arg(long = "miner-key", help = "PKCS#8 key of the mining wallet")]
        miner_key: PathBuf,
        #[arg(long = "key", help = "PKCS#8 key of a wallet that receives transfers")]
        keys: Vec<PathBuf>,
        #[arg(long, help = "Persist node chains in this Sled directory")]
        db: Option<PathBuf>,
    },
    #[command(name = "verify", about = "Print the per-block validity of a stored chain")]
    Verify {
        #[arg(long, help = "Sled directory written by simulate")]
        db: PathBuf,
        #[arg(long, help = "Node id")]
        node: String,
        #[arg(long, help = "Print the report as JSON")]
        json: bool,
    },
    #[command(
        name = "repair",
        about = "Rewrite one stored block's signature and recompute its hash"
    )]
    Repair {
        #[arg(long, help = "Sled directory written by simulate")]
        db: PathBuf,
        #[arg(long, help = "Node id")]
        node: String,
        #[arg(long, help = "Index of the block to rewrite")]
        index: u64,
        #[arg(long, help = "Replacement signature, base64")]
        signature: Option<String>,
    },
}
