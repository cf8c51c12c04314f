//! scalectl - operator CLI for the scale webhook
//!
//! Shows the webhook's health and live replicas, and sends synthetic
//! alerts for testing scaling rules.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{alert, replicas, status};

/// Scale webhook CLI
#[derive(Parser)]
#[command(name = "scalectl")]
#[command(author, version, about = "CLI for the scale webhook", long_about = None)]
pub struct Cli {
    /// Webhook URL (can also be set via SCALECTL_URL env var)
    #[arg(long, env = "SCALECTL_URL")]
    pub url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show webhook health and readiness
    Status,

    /// List the running replicas of the managed service
    Replicas,

    /// Send a synthetic alert to the webhook
    Alert {
        /// Alert name; `up` and `down` stand for the throughput alerts
        name: String,

        /// Send the alert as resolved instead of firing
        #[arg(long)]
        resolved: bool,

        /// Measured value annotation (e.g. 420 or 1.2e3)
        #[arg(long)]
        value: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let url = config::Config::load()?.resolve_url(cli.url);
    let client = client::ApiClient::new(&url)?;

    match cli.command {
        Commands::Status => status::show_status(&client, cli.format).await?,
        Commands::Replicas => replicas::list_replicas(&client, cli.format).await?,
        Commands::Alert {
            name,
            resolved,
            value,
        } => {
            alert::send_alert(&client, &name, resolved, value.as_deref(), cli.format).await?;
        }
    }

    Ok(())
}
