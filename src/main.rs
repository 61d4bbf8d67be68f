use clap::Parser;
use log::{error, info, LevelFilter};
use powchain::{Command, Node, Opt, Settings, Wallet};
use std::process;
use std::sync::Arc;

fn main() {
    env_logger::builder()
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
        Command::StartNode {
            config,
            listen,
            peers,
            difficulty,
            mine_every,
        } => {
            let mut settings = Settings::load(config.as_deref())?;
            if let Some(addr) = listen {
                settings.node_addr = addr;
            }
            if !peers.is_empty() {
                settings.seeds = peers;
            }
            if let Some(difficulty) = difficulty {
                settings.difficulty = difficulty;
            }
            if let Some(secs) = mine_every {
                settings.mining_interval_secs = secs;
            }
            settings.validate()?;

            // Identity lives only as long as the process
            let wallet = Wallet::new()?;
            info!("Signing identity: {}", wallet.get_address());

            let node = Node::new(settings, Arc::new(wallet))?;
            let addr = node.start()?;
            info!("Node {} listening on {addr}", node.get_node_id());
            node.wait();
        }
    }
    Ok(())
}
