//! Bucket Size Monitor CLI
//!
//! A command-line tool for triggering reports, inspecting the recorded size
//! history, evaluating the growth alarm and checking service health.

mod client;
mod commands;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{alarm, objects, report, status};

/// Bucket Size Monitor CLI
#[derive(Parser)]
#[command(name = "bmctl")]
#[command(author, version, about = "CLI for the Bucket Size Monitor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via BMCTL_API_URL env var)
    #[arg(long, env = "BMCTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render the recent size chart and upload it to the plot bucket
    Plot,

    /// List recent size snapshots
    Snapshots {
        /// Look-back window in seconds
        #[arg(long, default_value_t = 10)]
        since: u64,
    },

    /// Show the largest bucket size ever recorded
    Max,

    /// Size-growth alarm commands
    #[command(subcommand)]
    Alarm(AlarmCommands),

    /// Upload a local file into the monitored bucket
    Upload {
        /// File to upload
        file: PathBuf,

        /// Object key (defaults to the file name)
        #[arg(long, short)]
        key: Option<String>,
    },

    /// Delete an object from the monitored bucket
    Delete {
        /// Object key
        key: String,
    },

    /// Show service health and readiness
    Health,
}

#[derive(Subcommand)]
pub enum AlarmCommands {
    /// Evaluate the alarm now, evicting the largest object on breach
    Evaluate,
}

async fn run(cli: Cli) -> Result<()> {
    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Plot => report::trigger_plot(&client, cli.format).await,
        Commands::Snapshots { since } => report::list_snapshots(&client, since, cli.format).await,
        Commands::Max => report::show_max(&client, cli.format).await,
        Commands::Alarm(AlarmCommands::Evaluate) => alarm::evaluate(&client, cli.format).await,
        Commands::Upload { file, key } => objects::upload(&client, &file, key, cli.format).await,
        Commands::Delete { key } => objects::delete(&client, &key, cli.format).await,
        Commands::Health => status::show_health(&client, cli.format).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
