use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::config::{load_completed_matches, load_settings, load_tournament_config, save_plan};
use crate::schedule::preview;
use crate::standings::{standings, StandingsRules, TieBreak};
use crate::types::{GroupId, StageId};

#[derive(Parser)]
#[command(name = "pitch-scheduler")]
#[command(about = "Generate match schedules and group tables for a tournament", long_about = None)]
pub struct Cli {
    /// File with KEY=value overrides, read before anything else
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Write logs to a daily rolling file in this directory instead of stderr
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a schedule without saving it anywhere
    Preview {
        /// Tournament JSON file
        #[arg(long)]
        config: PathBuf,

        /// Write the plan here instead of printing it
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print the table of one group
    Standings {
        /// Tournament JSON file
        #[arg(long)]
        config: PathBuf,

        /// JSON list of completed matches
        #[arg(long)]
        results: PathBuf,

        #[arg(long)]
        stage: StageId,

        #[arg(long)]
        group: GroupId,

        /// Rank teams level on points by their mutual results first
        #[arg(long, default_value = "false")]
        head_to_head: bool,
    },
}

pub fn execute(command: Command) -> Result<(), String> {
    match command {
        Command::Preview { config, out } => {
            let tournament = load_tournament_config(&config)?;
            let settings = load_settings()?;
            let plan = preview(&tournament, &settings).map_err(|e| e.to_string())?;
            for issue in &plan.errors {
                eprintln!("error: {}", issue.message);
            }
            match out {
                Some(path) => {
                    save_plan(&path, &plan)?;
                    info!(path = %path.display(), matches = plan.matches.len(), "plan written");
                }
                None => {
                    let payload = serde_json::to_string_pretty(&plan).map_err(|e| e.to_string())?;
                    println!("{payload}");
                }
            }
            if plan.is_successful() {
                Ok(())
            } else {
                Err(format!("plan has {} error(s)", plan.errors.len()))
            }
        }
        Command::Standings {
            config,
            results,
            stage,
            group,
            head_to_head,
        } => {
            let tournament = load_tournament_config(&config)?;
            let completed = load_completed_matches(&results)?;
            let group_config = tournament
                .stage(stage)
                .and_then(|s| s.group(group))
                .ok_or_else(|| format!("stage {stage} has no group {group}"))?;
            let mut rules = StandingsRules::default();
            if head_to_head {
                rules.tie_breaks.insert(0, TieBreak::HeadToHead);
            }
            let table = standings(stage, group_config, &completed, &rules);
            println!("{:>3}  {:<24} {:>3} {:>3} {:>3} {:>3} {:>4} {:>4}", "#", "Team", "P", "W", "D", "L", "GD", "Pts");
            for row in &table {
                println!(
                    "{:>3}  {:<24} {:>3} {:>3} {:>3} {:>3} {:>4} {:>4}",
                    row.position, row.name, row.played, row.won, row.drawn, row.lost, row.goal_difference, row.points
                );
            }
            Ok(())
        }
    }
}
