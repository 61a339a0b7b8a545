mod api;
mod config;
mod error;
mod export;
mod logger;
mod models;
mod sync;
mod ui;

use anyhow::{Context, Result};
use api::Backend;
use clap::Parser;
use config::{Args, Config};
use ui::App;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args).context("Failed to load configuration")?;

    logger::init(&config.log_file)
        .with_context(|| format!("Failed to open log file {}", config.log_file.display()))?;

    let backend = Backend::from_config(&config);
    log::info!(
        "Starting with {} ({:?} sync)",
        backend.describe(),
        config.sync_mode
    );

    // Start TUI application
    let mut app = App::new(backend, config);
    app.run().await?;

    Ok(())
}
