//! Command-line interface definitions for News Relay.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Credentials and the common knobs can be provided via command-line flags or
//! environment variables (a `.env` file in the working directory is loaded
//! first).

use crate::models::Platform;
use clap::{Parser, Subcommand};

/// Command-line arguments for the News Relay application.
///
/// # Examples
///
/// ```sh
/// # Run the scheduler and command listener with credentials from the environment
/// news_relay
///
/// # Post a single round of news and exit
/// news_relay once
///
/// # Print what would be posted to Discord for one topic
/// news_relay preview --topic forex --platform discord
///
/// # Override topics and policy from a YAML file
/// news_relay --config ./news_relay.yaml run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Mode>,

    /// Optional path to a YAML config file (topics, policy, endpoints, timeouts)
    #[arg(short, long, env = "NEWS_RELAY_CONFIG")]
    pub config: Option<String>,

    /// NewsAPI key
    #[arg(long, env = "NEWS_API_KEY", hide_env_values = true)]
    pub news_api_key: Option<String>,

    /// GNews API token
    #[arg(long, env = "GNEWS_API_KEY", hide_env_values = true)]
    pub gnews_api_key: Option<String>,

    /// Guardian Open Platform API key
    #[arg(long, env = "GUARDIAN_API_KEY", hide_env_values = true)]
    pub guardian_api_key: Option<String>,

    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_bot_token: Option<String>,

    /// Telegram destination chat/channel ID (numeric, may be negative)
    #[arg(long, env = "TELEGRAM_CHANNEL_ID", allow_hyphen_values = true)]
    pub telegram_channel_id: Option<String>,

    /// Discord bot token
    #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    pub discord_bot_token: Option<String>,

    /// Discord destination channel ID
    #[arg(long, env = "DISCORD_CHANNEL_ID")]
    pub discord_channel_id: Option<String>,

    /// Seconds between scheduled fetch-and-post cycles
    #[arg(long, env = "FETCH_INTERVAL_SECS")]
    pub fetch_interval_secs: Option<u64>,

    /// Maximum articles kept per topic
    #[arg(long, env = "MAX_ARTICLES_PER_TOPIC")]
    pub max_articles_per_topic: Option<usize>,
}

/// What to do once configuration is loaded.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Post news periodically and answer chat commands (default)
    Run,
    /// Run a single fetch-format-post cycle and exit
    Once,
    /// Fetch and print formatted messages without posting
    Preview {
        /// Only this topic (default: all topics)
        #[arg(long)]
        topic: Option<String>,

        /// Which platform's formatting to print
        #[arg(long, value_enum, default_value_t = Platform::Telegram)]
        platform: Platform,
    },
}
