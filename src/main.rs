#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

use anyhow::Result;
use clap::Parser;
use coffer::checkpoint::{CheckpointLayout, CheckpointManager};
use coffer::clock::CoarseClock;
use coffer::config::Config;
use coffer::gate::OperationsGate;
use coffer::housekeeping::HousekeepingManager;
use coffer::persist::TomlKv;
use coffer::stores::{AccountStore, FeedbackStore, ListenerStatus, SessionStore, StateStore, StoreSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Durable checkpoint and autosave daemon.
#[derive(Debug, Parser)]
#[command(name = "coffer", version)]
struct Cli {
    /// Use this directory for config and data instead of ~/.coffer
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    let config = match &cli.config_dir {
        Some(dir) => Config::load_or_init_at(dir)?,
        None => Config::load_or_init()?,
    };

    run(config).await
}

async fn run(config: Config) -> Result<()> {
    let clock = CoarseClock::start(Duration::from_millis(config.clock.refresh_millis));
    let handle = clock.handle();

    let hk = &config.housekeeping;
    let interval = Duration::from_secs(hk.interval_minutes * 60);
    let accounts = Arc::new(AccountStore::new(
        handle.clone(),
        Duration::from_secs(hk.pending_account_ttl_minutes * 60),
        interval,
    ));
    let feedback = Arc::new(FeedbackStore::new(
        handle.clone(),
        Duration::from_secs(hk.feedback_retention_days * 86_400),
        interval,
    ));
    let sessions = Arc::new(SessionStore::new(
        handle.clone(),
        Duration::from_secs(hk.session_idle_minutes * 60),
        interval,
    ));

    let stores = StoreSet::new(
        Arc::clone(&accounts) as Arc<dyn StateStore>,
        Arc::clone(&feedback) as Arc<dyn StateStore>,
        Arc::clone(&sessions) as Arc<dyn StateStore>,
    );

    let data_dir = config.data_dir();
    let layout = CheckpointLayout::new(&data_dir);
    // A fresh install has no primary checkpoint yet; an empty directory
    // loads as the empty dataset.
    std::fs::create_dir_all(layout.primary())?;

    let kv = Arc::new(TomlKv::new(data_dir.join("autosave.toml")));
    let manager = Arc::new(CheckpointManager::new(
        layout,
        stores.clone(),
        kv,
        config.autosave_settings(),
    ));
    let housekeeping = Arc::new(HousekeepingManager::new(stores));
    let gate = OperationsGate::new(
        manager,
        housekeeping,
        Arc::clone(&sessions) as Arc<dyn ListenerStatus>,
    );

    gate.load_primary()?;
    gate.start_auto_save()?;
    gate.start_housekeeping()?;
    sessions.set_accepting(true);
    tracing::info!("Coffer is up (data: {}); Ctrl-C to shut down", data_dir.display());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    // Reverse of startup: stop accepting, stop the background cycles, then
    // flush the primary checkpoint while nothing else can write.
    sessions.set_accepting(false);
    gate.shutdown_housekeeping()?;
    gate.shutdown_auto_save().await?;
    gate.save_primary()?;
    clock.shutdown().await;
    Ok(())
}
