use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use tokio::signal;
use tokio::time::Duration;
use zar_config::Config;
use zar_core::consensus::RewardRecipients;
use zar_core::{ChainStore, FileStore};

#[derive(Parser, Debug)]
#[command(name = "zar-node", version, about = "ZAR proof-of-work ledger node")]
struct Cli {
    /// Path to the configuration file (default: ~/.zar/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the data directory from the configuration file
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the genesis difficulty used when no snapshot exists
    #[arg(long)]
    difficulty: Option<u32>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,

    /// Serve requests without running the periodic miner
    #[arg(long)]
    no_mining: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .parse_default_env()
        .init();

    info!("🚀 ZAR node starting...");

    let mut cfg = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = &cli.data_dir {
        cfg.data_dir = dir.to_string_lossy().into_owned();
    }
    if let Some(difficulty) = cli.difficulty {
        cfg.initial_difficulty = difficulty;
    }

    let data_dir = cfg.data_dir_resolved();
    let mut store = FileStore::open(&data_dir, cfg.checkpoint_interval)
        .with_context(|| format!("open data directory {}", data_dir.display()))?;
    let chain = store.load(cfg.initial_difficulty)?;
    info!(
        "Current Blockchain Height: {} | Latest Block Hash: {}",
        chain.height(),
        chain.latest_hash()?
    );

    let recipients = RewardRecipients::new(
        &cfg.miner_address,
        &cfg.staker_address,
        &cfg.treasury_address,
    );
    let (handle, engine) = zar_node::start(chain, Box::new(store), recipients);

    let miner = if cli.no_mining {
        info!("Mining disabled (--no-mining)");
        None
    } else {
        Some(zar_node::spawn_miner(
            handle.clone(),
            Duration::from_secs(cfg.mining_interval_secs),
        ))
    };

    info!("Node is running. Press Ctrl+C to stop.");
    signal::ctrl_c().await.context("listen for ctrl-c")?;
    info!("Shutting down...");

    handle.stop_mining();
    if let Some(miner) = miner {
        if let Err(e) = miner.await {
            log::error!("Mining loop ended abnormally: {}", e);
        }
    }
    handle.shutdown().await?;
    engine.await.context("chain engine task")?;
    info!("Bye");
    Ok(())
}
