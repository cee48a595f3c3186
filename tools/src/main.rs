//! bot-runner: headless runner for the rewards engine.
//!
//! Reads inbound events as JSON lines on stdin, applies each to the
//! engine, and prints the outcome (or error) as a JSON line on stdout.
//! Outbound notifications go to the console messenger.
//!
//! Usage:
//!   bot-runner --db rewards.db --config config.json
//!   echo '{"event":"bootstrap","user_id":42}' | bot-runner

use anyhow::Result;
use rewards_core::{
    clock::WallClock,
    command::InboundEvent,
    config::EngineConfig,
    engine::RewardsEngine,
    gateway::{ConsoleMessenger, OpenGate},
    store::SnapshotStore,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let config = match args.windows(2).find(|w| w[0] == "--config") {
        Some(w) => EngineConfig::load(Path::new(&w[1]))?,
        None => EngineConfig::default(),
    };

    log::info!("bot-runner starting: db={db} root_admin={}", config.root_admin);

    let store = SnapshotStore::open(db)?;
    let mut engine = RewardsEngine::open(
        config,
        store,
        Box::new(ConsoleMessenger),
        Box::new(OpenGate),
        Box::new(WallClock),
    )?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<InboundEvent>(trimmed) {
            Ok(event) => match engine.dispatch(event) {
                Ok(outcome) => serde_json::to_string(&outcome)?,
                Err(err) => format!("{{\"error\":{}}}", serde_json::to_string(&err.to_string())?),
            },
            Err(err) => format!("{{\"error\":{}}}", serde_json::to_string(&err.to_string())?),
        };
        let mut out = stdout.lock();
        writeln!(out, "{reply}")?;
        out.flush()?;
    }

    let stats = engine.stats();
    log::info!(
        "shutting down: {} accounts, {} orders, {} products",
        stats.total_accounts,
        stats.total_orders,
        stats.product_count
    );
    Ok(())
}
