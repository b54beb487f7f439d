pub mod types;
pub mod bracket;
pub mod errors;
pub mod config;
pub mod pairing;
pub mod advancement;
pub mod allocator;
pub mod standings;
pub mod schedule;
pub mod store;
pub mod cli;

pub use advancement::{Advancement, MatchState, SlotUpdate};
pub use allocator::{AllocationOutcome, Allocator, Timeline};
pub use bracket::{BracketPosition, MatchRef, Participant};
pub use config::EngineSettings;
pub use errors::ConfigError;
pub use schedule::{generate_and_commit, generate_plan, preview, sync_plan};
pub use standings::{standings, StandingsRules, TeamStanding, TieBreak};
pub use store::{clear_tournament, commit_plan, InMemoryMatchStore, MatchStore, SharedMatchStore};
pub use types::*;

use clap::Parser;
use std::{fs, path::Path};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

// ── Logging ────────────────────────────────────────────────────────────

/// Installs the global subscriber. With a log directory, output goes to a
/// daily rolling file; keep the returned guard alive until exit so buffered
/// lines are flushed. Library code never calls this.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).ok();
            let file_appender = tracing_appender::rolling::daily(dir, "pitch-scheduler.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .try_init()
                .ok()?;
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .ok();
            None
        }
    }
}

// ── Entry point ────────────────────────────────────────────────────────

pub fn run() -> Result<(), String> {
    let cli = cli::Cli::parse();
    if let Some(env_file) = cli.env_file.as_deref() {
        config::load_env_file(env_file)?;
    } else {
        config::load_env_file(Path::new(".env"))?;
    }
    let _guard = init_tracing(cli.log_dir.as_deref());
    info!("pitch-scheduler starting");
    cli::execute(cli.command)
}
