//! Sentinel operator CLI
//!
//! A command-line tool for listing and working alerts, checking engine
//! health, and feeding test samples into a running sentineld.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{alerts, debug, status};

/// Sentinel operator CLI
#[derive(Parser)]
#[command(name = "sentinelctl")]
#[command(author, version, about = "Operator CLI for the Sentinel anomaly engine", long_about = None)]
pub struct Cli {
    /// API endpoint URL. Falls back to the config file, then to
    /// http://localhost:8080
    #[arg(long, env = "SENTINEL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List active alerts
    Active {
        /// Filter by category (trading, system, security, ...)
        #[arg(long, short)]
        category: Option<String>,

        /// Filter by severity (critical, high, medium, low)
        #[arg(long, short)]
        severity: Option<String>,

        /// Filter by acknowledgment state
        #[arg(long)]
        acknowledged: Option<bool>,
    },

    /// Acknowledge an alert
    Ack {
        /// Alert ID (full UUID)
        id: String,

        /// Operator name recorded on the alert
        #[arg(long, default_value = "cli-user")]
        by: String,
    },

    /// Resolve an alert
    Resolve {
        /// Alert ID (full UUID)
        id: String,

        /// Operator name recorded on the alert
        #[arg(long, default_value = "cli-user")]
        by: String,

        /// Resolution note
        #[arg(long)]
        resolution: Option<String>,
    },

    /// Show alert history, newest first
    History {
        /// Filter by category
        #[arg(long, short)]
        category: Option<String>,

        /// Filter by severity
        #[arg(long, short)]
        severity: Option<String>,

        /// Maximum records to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show engine statistics
    Stats,

    /// Show engine health and readiness
    Health,

    /// Feed samples into a tracked metric (for testing detection)
    Record {
        /// Metric name
        name: String,

        /// Sample value
        value: f64,

        /// How many identical samples to send
        #[arg(long, default_value = "1")]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Endpoint resolution: flag, then SENTINEL_API_URL, then config file.
    let api_url = match cli.api_url {
        Some(url) => url,
        None => config::Config::load()
            .unwrap_or_default()
            .api_url
            .unwrap_or_else(|| config::DEFAULT_API_URL.to_string()),
    };

    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Active {
            category,
            severity,
            acknowledged,
        } => {
            alerts::list_active(&client, category, severity, acknowledged, cli.format).await?;
        }
        Commands::Ack { id, by } => {
            alerts::acknowledge(&client, &id, &by, cli.format).await?;
        }
        Commands::Resolve { id, by, resolution } => {
            alerts::resolve(&client, &id, &by, resolution, cli.format).await?;
        }
        Commands::History {
            category,
            severity,
            limit,
        } => {
            alerts::history(&client, category, severity, limit, cli.format).await?;
        }
        Commands::Stats => {
            status::show_statistics(&client, cli.format).await?;
        }
        Commands::Health => {
            status::show_health(&client, cli.format).await?;
        }
        Commands::Record { name, value, count } => {
            debug::record_sample(&client, &name, value, count, cli.format).await?;
        }
    }

    Ok(())
}
