//! # Tutorline Server
//!
//! Realtime chat server for the Tutorline education platform.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! tutorline
//!
//! # Run with custom config
//! tutorline --config /path/to/tutorline.toml
//!
//! # Run with environment variables
//! TUTORLINE__PORT=8080 TUTORLINE__AUTH__JWT_SECRET=change-me tutorline
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tutorline_server::Config;

/// Tutorline chat server
#[derive(Parser, Debug)]
#[command(name = "tutorline")]
#[command(about = "Realtime chat server for the Tutorline education platform")]
#[command(version)]
struct Args {
    /// Path to a TOML config file; environment variables still override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutorline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.validate()?;

    tracing::info!("Starting Tutorline server on {}:{}", config.host, config.port);

    // Initialize metrics
    tutorline_server::metrics::init_metrics();

    // Start the server
    tutorline_server::run(config).await?;

    Ok(())
}
