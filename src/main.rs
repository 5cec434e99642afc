//! # News Relay
//!
//! Fetches recent articles for a fixed set of topics from public news APIs,
//! deduplicates and formats them, and posts them to a Telegram channel and a
//! Discord channel. Telegram users can also request news on demand.
//!
//! ## Features
//!
//! - Queries NewsAPI, GNews and The Guardian (any provider with a key)
//! - Deduplicates by normalized URL and keeps the first `N` per topic
//! - Renders Markdown for Telegram and Discord, split under each platform's
//!   message length cap
//! - Answers `/start`, `/help`, `/<topic>` and `/allnews` over Telegram
//!
//! ## Usage
//!
//! ```sh
//! NEWS_API_KEY=... TELEGRAM_BOT_TOKEN=... TELEGRAM_CHANNEL_ID=... news_relay
//! news_relay once
//! news_relay preview --topic forex --platform discord
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: every provider is asked for every topic keyword concurrently
//! 2. **Merging**: batches are deduplicated by URL and bounded per topic
//! 3. **Formatting**: one message list per platform
//! 4. **Dispatch**: messages are posted in order, serialized per platform

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregator;
mod api;
mod cli;
mod commands;
mod config;
mod dispatcher;
mod error;
mod formatter;
mod models;
mod service;
mod sinks;
mod sources;
mod utils;

use cli::{Cli, Mode};
use config::Config;
use service::App;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    if let Err(e) = dotenv::dotenv() {
        debug!(error = %e, "No .env file loaded");
    }

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "news_relay starting up");

    let args = Cli::parse();
    let mode = args.command.clone().unwrap_or(Mode::Run);
    debug!(?mode, config = ?args.config, "Parsed CLI arguments");

    // Configuration errors are the only fatal ones.
    let config = Config::load(&args).inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
    let ready = match mode {
        Mode::Preview { .. } => config.require_providers(),
        Mode::Run | Mode::Once => config.validate_for_posting(),
    };
    ready.inspect_err(|e| error!(error = %e, "Invalid configuration"))?;

    let app = Arc::new(App::from_config(&config)?);

    match mode {
        Mode::Run => app.run().await,
        Mode::Once => {
            let reports = app.run_cycle().await;
            let failed: usize = reports.iter().map(|r| r.failed).sum();
            info!(platforms = reports.len(), failed, "Single cycle complete");
        }
        Mode::Preview { topic, platform } => {
            let messages = app.preview(topic.as_deref(), platform).await?;
            if messages.is_empty() {
                println!("(no articles found)");
            }
            for (i, message) in messages.iter().enumerate() {
                if i > 0 {
                    println!("\n----------------------------------------\n");
                }
                println!("{message}");
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), "Execution complete");
    Ok(())
}
