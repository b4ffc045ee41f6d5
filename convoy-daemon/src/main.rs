//! convoyd: the Convoy fleet daemon

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use convoy_config::{ConfigLoader, LogFormat, LoggingConfig};

mod app;
mod runtime;

/// Supervises a fleet of proxy workers behind an L4 load balancer
#[derive(Parser)]
#[command(name = "convoyd", version, about)]
struct Cli {
    /// Path to the YAML configuration file. Defaults plus CONVOY_*
    /// environment overrides apply when omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load(cli.config.as_ref())
        .context("loading configuration")?;

    if cli.check {
        println!("configuration OK");
        return Ok(());
    }

    init_tracing(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "convoyd starting");

    app::run(config).await
}

/// `RUST_LOG` wins when set; otherwise the configured level applies
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Text => builder.init(),
    }
}
