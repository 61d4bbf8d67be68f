use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "powchain", about = "Proof-of-work blockchain node")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a blockchain node")]
    StartNode {
        #[arg(long, help = "TOML settings file")]
        config: Option<PathBuf>,
        #[arg(long, help = "Address to listen on, e.g. 127.0.0.1:2001")]
        listen: Option<String>,
        #[arg(long = "peer", help = "Seed peer host:port, may be repeated")]
        peers: Vec<String>,
        #[arg(long, help = "Leading zero hex digits required of mined blocks")]
        difficulty: Option<u32>,
        #[arg(long = "mine-every", help = "Mine pending transactions every SECS seconds")]
        mine_every: Option<u64>,
    },
}
