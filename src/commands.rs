//! On-demand chat commands.
//!
//! | Command | Action |
//! |---------|--------|
//! | `/start` | Welcome message |
//! | `/help` | List commands |
//! | `/<topic>` | Fetch one configured topic |
//! | `/allnews` | Fetch every topic |
//!
//! Commands are case-insensitive and may carry a `@botname` suffix as
//! Telegram sends in group chats. Failures are answered with a short apology,
//! never with internal details beyond the error summary.

use crate::aggregator::Aggregator;
use crate::formatter;
use crate::models::{NewsSet, Platform, TopicConfig};
use crate::utils::upcase;
use std::fmt::Write;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Topic(String),
    AllNews,
    Unknown(String),
}

impl Command {
    /// Parse a chat message. Returns `None` for text that is not a command.
    pub fn parse(text: &str, topics: &[TopicConfig]) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or_default().to_lowercase();

        let command = match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "allnews" => Command::AllNews,
            other => match topics.iter().find(|t| t.name.eq_ignore_ascii_case(other)) {
                Some(topic) => Command::Topic(topic.name.clone()),
                None => Command::Unknown(other.to_string()),
            },
        };
        Some(command)
    }
}

pub fn welcome_text(topics: &[TopicConfig]) -> String {
    let names: Vec<&str> = topics.iter().map(|t| t.name.as_str()).collect();
    format!(
        "📰 Welcome to the News Bot!\nI fetch the latest news on {}.\nUse /help to see available commands.",
        names.join(", ")
    )
}

pub fn help_text(topics: &[TopicConfig]) -> String {
    let mut text = String::from("📋 Available Commands:\n/start - Get welcome message\n/help - List commands\n");
    for topic in topics {
        let _ = writeln!(text, "/{} - {} news", topic.name, upcase(&topic.name));
    }
    text.push_str("/allnews - All topics");
    text
}

/// Short apologetic reply for a failed fetch.
pub fn apology(summary: &str) -> String {
    format!("⚠️ Sorry, I couldn't fetch news right now: {summary}")
}

/// Run a command and produce the reply messages for `platform`.
pub async fn handle(command: &Command, aggregator: &Aggregator, platform: Platform) -> Vec<String> {
    match command {
        Command::Start => vec![welcome_text(aggregator.topics())],
        Command::Help => vec![help_text(aggregator.topics())],
        Command::Unknown(name) => {
            vec![format!("Unknown command /{name}. Use /help to see available commands.")]
        }
        Command::Topic(topic) => match aggregator.fetch_topic_named(topic).await {
            Ok(articles) if articles.is_empty() => {
                info!(%topic, "No articles for on-demand request");
                vec![format!("No recent {topic} news found.")]
            }
            Ok(articles) => {
                let mut news = NewsSet::new();
                news.insert(topic.clone(), articles);
                formatter::format(&news, platform)
            }
            Err(e) => {
                warn!(%topic, error = %e, "On-demand fetch failed");
                vec![apology(&e.to_string())]
            }
        },
        Command::AllNews => {
            let news = aggregator.get_all_news().await;
            if news.is_empty() {
                vec!["No recent news found for any topic.".to_string()]
            } else {
                formatter::format(&news, platform)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregationPolicy;
    use crate::models::default_topics;
    use crate::sources::NewsSource;
    use crate::sources::testing::StaticSource;
    use std::sync::Arc;
    use std::time::Duration;

    fn aggregator(source: StaticSource) -> Aggregator {
        let sources: Vec<Arc<dyn NewsSource>> = vec![Arc::new(source)];
        Aggregator::new(sources, default_topics(), AggregationPolicy::default(), Duration::from_secs(5))
    }

    #[test]
    fn test_parse_commands() {
        let topics = default_topics();
        assert_eq!(Command::parse("/start", &topics), Some(Command::Start));
        assert_eq!(Command::parse("/HELP", &topics), Some(Command::Help));
        assert_eq!(Command::parse("/allnews@NewsBot", &topics), Some(Command::AllNews));
        assert_eq!(
            Command::parse("  /Forex please", &topics),
            Some(Command::Topic("forex".to_string()))
        );
        assert_eq!(
            Command::parse("/sports", &topics),
            Some(Command::Unknown("sports".to_string()))
        );
        assert_eq!(Command::parse("hello there", &topics), None);
        assert_eq!(Command::parse("", &topics), None);
    }

    #[test]
    fn test_help_lists_every_topic() {
        let help = help_text(&default_topics());
        for topic in ["/cybersecurity", "/cryptocurrency", "/forex", "/allnews", "/start"] {
            assert!(help.contains(topic), "missing {topic}");
        }
    }

    #[tokio::test]
    async fn test_topic_command_formats_for_platform() {
        let agg = aggregator(StaticSource::new("s").with("forex", &["https://n.com/f?utm=x"]));
        let replies = handle(&Command::Topic("forex".into()), &agg, Platform::Telegram).await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("Latest Forex News"));
        assert!(replies[0].contains("(https://n.com/f)"));
    }

    #[tokio::test]
    async fn test_empty_topic_reply() {
        let agg = aggregator(StaticSource::new("s").failing());
        let replies = handle(&Command::Topic("forex".into()), &agg, Platform::Discord).await;
        assert_eq!(replies, vec!["No recent forex news found.".to_string()]);

        let replies = handle(&Command::AllNews, &agg, Platform::Discord).await;
        assert_eq!(replies, vec!["No recent news found for any topic.".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_topic_gets_apology() {
        let agg = aggregator(StaticSource::new("s"));
        let replies = handle(&Command::Topic("sports".into()), &agg, Platform::Telegram).await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with("⚠️ Sorry"));
        assert!(replies[0].contains("sports"));
    }
}
