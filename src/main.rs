#[macro_use]
extern crate log;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use roulette_client::config;
use roulette_client::controller::ChatHandle;
use roulette_client::logger;
use roulette_client::service::LoopbackHub;
use roulette_client::session::SessionPhase;
use roulette_client::storage::{FileStorage, MemoryStorage, Storage};
use roulette_client::visitors::VisitorCounter;
use roulette_client::Result;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Verbose logging
    #[arg(long, default_value = "false")]
    verbose: bool,
}

/// Demo: pair two loopback endpoints of this process, exchange a greeting,
/// then leave.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(args.verbose)?;
    let config = config::load(Path::new(&args.config))?;

    let durable: Arc<dyn Storage> = Arc::new(FileStorage::open(&FileStorage::default_path()?)?);
    let session_store: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let visits = VisitorCounter::new(durable, session_store).record()?;
    info!("you are visitor number {}", visits);

    let hub = LoopbackHub::new(config.match_timeout());
    let mut alice = ChatHandle::spawn(Box::new(hub.endpoint().await), &config.controller());
    let mut bob = ChatHandle::spawn(Box::new(hub.endpoint().await), &config.controller());

    alice
        .snapshot
        .wait_for(|s| s.phase == SessionPhase::Connected)
        .await?;
    bob.snapshot
        .wait_for(|s| s.phase == SessionPhase::Connected)
        .await?;
    alice.send_message("hello from the other side").await;

    let seen = bob
        .snapshot
        .wait_for(|s| !s.messages.is_empty())
        .await?
        .clone();
    for message in &seen.messages {
        info!("[{}] {}", <&str>::from(message.sender), message.text);
    }

    alice.end().await;
    bob.end().await;
    alice.join().await?;
    bob.join().await?;
    Ok(())
}
