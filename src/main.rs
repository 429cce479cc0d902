//! take-care-coach: drinking-pace coach.
//!
//! ```bash
//! take-care-coach run --inbox ~/.take-care/inbox.jsonl --outbox ~/.take-care/outbox.jsonl
//! take-care-coach evaluate --input night.json
//! take-care-coach history --limit 5
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use take_care_lib::{config, init_logging, replay_evaluate, run_coach, session_history, RunOptions};

/// Watches a night's drinks and nudges before the pace gets away from you.
#[derive(Parser, Debug)]
#[command(name = "take-care-coach", version)]
struct Args {
    /// Config, journal and log directory
    #[arg(long, env = "TAKE_CARE_HOME", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the live coach; reads commands from stdin, prints JSON lines
    Run {
        /// Sync messages from the paired device (JSON lines)
        #[arg(long)]
        inbox: Option<PathBuf>,

        /// Where outbound sync messages are appended
        #[arg(long)]
        outbox: Option<PathBuf>,
    },
    /// Evaluate a recorded night once and print the result
    Evaluate {
        /// JSON file with events, settings, now_ms and recent_advisories
        #[arg(long)]
        input: PathBuf,
    },
    /// List recent sessions from the journal
    History {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let data_dir = args.data_dir.unwrap_or_else(config::default_data_dir);

    match args.command {
        Command::Run { inbox, outbox } => {
            let log_dir = init_logging(&data_dir)?;
            tracing::info!("Take Care coach starting, logs in {}", log_dir.display());
            run_coach(RunOptions { data_dir, inbox, outbox }).await?;
        }
        Command::Evaluate { input } => {
            let raw = std::fs::read_to_string(&input)
                .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", input.display(), e))?;
            let result = replay_evaluate(&raw)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::History { limit } => {
            for row in session_history(&data_dir, limit)? {
                println!("{}", serde_json::to_string(&row)?);
            }
        }
    }
    Ok(())
}
