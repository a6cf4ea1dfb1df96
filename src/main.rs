//! Entry point: parses CLI args, initializes structured logging, loads
//! configuration, and runs the `Core` through its `Init → Run → Shutdown`
//! lifecycle (§9).

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vistterstream::config;
use vistterstream::Core;

#[derive(Parser, Debug)]
#[command(name = "vistterstream", about = "Live-video production engine")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "vistterstream.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = if cli.config.exists() {
        config::Config::from_file(&cli.config)?
    } else {
        tracing::warn!(path = %cli.config.display(), "config file not found, using defaults");
        config::Config::default()
    };

    let core = Core::init(config).await?;
    core.run().await
}
