//! Long-running wiring: the periodic broadcast and the Telegram command loop.

use crate::aggregator::Aggregator;
use crate::api::build_client;
use crate::commands::{self, Command};
use crate::config::Config;
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::error::ConfigError;
use crate::formatter;
use crate::models::{NewsSet, Platform};
use crate::sinks::telegram::{TelegramApi, Update};
use crate::sinks::{DiscordSink, MessageSink, TelegramSink};
use crate::sources::{GNewsClient, GuardianClient, NewsApiClient, NewsSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval, sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

const POLL_TIMEOUT: Duration = Duration::from_secs(25);
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(5);

/// Telegram bot connection used for answering commands.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    pub api: TelegramApi,
    /// The broadcast channel; replies there go through the dispatcher.
    pub channel_id: i64,
}

pub struct App {
    aggregator: Arc<Aggregator>,
    dispatcher: Arc<Dispatcher>,
    commands: Option<CommandChannel>,
    fetch_interval: Duration,
    command_timeout: Duration,
}

impl App {
    /// Wire providers and sinks from a resolved [`Config`].
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let http = build_client(config.request_timeout).map_err(|e| ConfigError::Invalid {
            name: "http client",
            reason: e.to_string(),
        })?;
        let endpoints = &config.endpoints;
        let settings = &config.source_settings;

        let mut sources: Vec<Arc<dyn NewsSource>> = Vec::new();
        if let Some(key) = &config.providers.newsapi {
            sources.push(Arc::new(NewsApiClient::new(http.clone(), &endpoints.newsapi, key, settings.clone())));
        }
        if let Some(key) = &config.providers.gnews {
            sources.push(Arc::new(GNewsClient::new(http.clone(), &endpoints.gnews, key, settings.clone())));
        }
        if let Some(key) = &config.providers.guardian {
            sources.push(Arc::new(GuardianClient::new(http.clone(), &endpoints.guardian, key, settings.clone())));
        }
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        info!(providers = ?names, "News providers enabled");

        let mut sinks: Vec<Arc<dyn MessageSink>> = Vec::new();
        let mut commands = None;
        if let Some(target) = &config.telegram {
            let api = TelegramApi::new(http.clone(), &endpoints.telegram, &target.token);
            sinks.push(Arc::new(TelegramSink::new(api.clone(), target.chat_id)));
            commands = Some(CommandChannel {
                api,
                channel_id: target.chat_id,
            });
        }
        if let Some(target) = &config.discord {
            sinks.push(Arc::new(DiscordSink::new(
                &endpoints.discord,
                &target.token,
                target.channel_id,
                config.request_timeout,
            )));
        }

        let call_timeout = config.provider_call_timeout();
        let aggregator = Aggregator::new(sources, config.topics.clone(), config.policy, call_timeout);
        let dispatcher = Dispatcher::new(sinks, config.message_delay);
        let active = dispatcher.platforms();
        for platform in Platform::ALL {
            if active.contains(&platform) {
                info!(%platform, "Posting enabled");
            } else {
                info!(%platform, "Platform not configured; skipping");
            }
        }
        Ok(Self::new(
            Arc::new(aggregator),
            Arc::new(dispatcher),
            commands,
            config.fetch_interval,
            call_timeout + Duration::from_secs(5),
        ))
    }

    pub fn new(
        aggregator: Arc<Aggregator>,
        dispatcher: Arc<Dispatcher>,
        commands: Option<CommandChannel>,
        fetch_interval: Duration,
        command_timeout: Duration,
    ) -> Self {
        Self {
            aggregator,
            dispatcher,
            commands,
            fetch_interval,
            command_timeout,
        }
    }

    /// One fetch-format-post round.
    #[instrument(level = "info", skip_all)]
    pub async fn run_cycle(&self) -> Vec<DispatchReport> {
        let news = self.aggregator.get_all_news().await;
        if news.is_empty() {
            info!("Nothing to post this cycle");
            return Vec::new();
        }
        let reports = self.dispatcher.broadcast(&news).await;
        for report in &reports {
            info!(
                platform = %report.platform,
                sent = report.sent,
                failed = report.failed,
                "Broadcast finished"
            );
        }
        reports
    }

    /// Formatted messages without posting them.
    pub async fn preview(&self, topic: Option<&str>, platform: Platform) -> Result<Vec<String>, ConfigError> {
        let news = match topic {
            Some(name) => {
                let articles = self.aggregator.fetch_topic_named(name).await?;
                let mut news = NewsSet::new();
                news.insert(name.to_lowercase(), articles);
                news
            }
            None => self.aggregator.get_all_news().await,
        };
        Ok(formatter::format(&news, platform))
    }

    /// Run the scheduler and, when Telegram is configured, the command loop
    /// until Ctrl-C.
    pub async fn run(self: Arc<Self>) {
        let scheduler = Arc::clone(&self).schedule();
        let listener = Arc::clone(&self).listen_for_commands();

        tokio::select! {
            _ = scheduler => {}
            _ = listener => {}
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Shutdown requested");
            }
        }
    }

    async fn schedule(self: Arc<Self>) {
        let mut ticker = interval(self.fetch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(every = ?self.fetch_interval, "Scheduler started");
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    async fn listen_for_commands(self: Arc<Self>) {
        let Some(channel) = self.commands.clone() else {
            // Nothing to listen on; park so the scheduler keeps the process alive.
            std::future::pending::<()>().await;
            return;
        };

        info!("Listening for Telegram commands");
        let mut offset: Option<i64> = None;
        loop {
            let updates = match channel.api.get_updates(offset, POLL_TIMEOUT).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "Polling Telegram updates failed");
                    sleep(POLL_ERROR_PAUSE).await;
                    continue;
                }
            };
            for update in updates {
                offset = Some(update.update_id + 1);
                let app = Arc::clone(&self);
                tokio::spawn(async move { app.handle_update(update).await });
            }
        }
    }

    /// Answer one incoming message if it is a command.
    #[instrument(level = "info", skip_all, fields(update_id = update.update_id))]
    pub async fn handle_update(&self, update: Update) {
        let Some(channel) = &self.commands else {
            return;
        };
        let Some(message) = update.message else {
            return;
        };
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let Some(command) = Command::parse(text, self.aggregator.topics()) else {
            debug!("Ignoring non-command message");
            return;
        };
        let chat_id = message.chat.id;
        info!(chat_id, ?command, "Handling command");

        let replies = match timeout(
            self.command_timeout,
            commands::handle(&command, &self.aggregator, Platform::Telegram),
        )
        .await
        {
            Ok(replies) => replies,
            Err(_) => {
                warn!(chat_id, ?command, "Command timed out");
                vec![commands::apology("the request timed out")]
            }
        };

        if chat_id == channel.channel_id {
            self.dispatcher.post(Platform::Telegram, &replies).await;
            return;
        }
        for reply in &replies {
            if let Err(e) = channel.api.send_message(chat_id, reply).await {
                warn!(chat_id, error = %e, "Failed to send command reply");
                if e.is_terminal() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregationPolicy;
    use crate::models::default_topics;
    use crate::sinks::testing::RecordingSink;
    use crate::sources::testing::StaticSource;
    use httpmock::Method::POST;
    use httpmock::MockServer;

    fn aggregator(source: StaticSource) -> Arc<Aggregator> {
        let sources: Vec<Arc<dyn NewsSource>> = vec![Arc::new(source)];
        Arc::new(Aggregator::new(
            sources,
            default_topics(),
            AggregationPolicy::default(),
            Duration::from_secs(5),
        ))
    }

    fn sinks(list: &[&Arc<RecordingSink>]) -> Vec<Arc<dyn MessageSink>> {
        list.iter().map(|s| Arc::clone(*s) as Arc<dyn MessageSink>).collect()
    }

    fn update(chat_id: i64, text: &str) -> Update {
        serde_json::from_value(serde_json::json!({
            "update_id": 7,
            "message": { "chat": { "id": chat_id }, "text": text }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_cycle_broadcasts_to_every_sink() {
        let telegram = Arc::new(RecordingSink::new(Platform::Telegram));
        let discord = Arc::new(RecordingSink::new(Platform::Discord));
        let app = App::new(
            aggregator(StaticSource::new("s").with("cybersecurity", &["https://n.com/r"])),
            Arc::new(Dispatcher::new(sinks(&[&telegram, &discord]), Duration::ZERO)),
            None,
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        let reports = app.run_cycle().await;
        assert_eq!(reports.len(), 2);
        assert_eq!(telegram.sent().len(), 1);
        assert!(telegram.sent()[0].contains("Latest Cybersecurity News"));
        assert!(discord.sent()[0].contains("<https://n.com/r>"));
    }

    #[tokio::test]
    async fn test_run_cycle_with_nothing_fetched() {
        let discord = Arc::new(RecordingSink::new(Platform::Discord));
        let app = App::new(
            aggregator(StaticSource::new("s").failing()),
            Arc::new(Dispatcher::new(sinks(&[&discord]), Duration::ZERO)),
            None,
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        assert!(app.run_cycle().await.is_empty());
        assert!(discord.sent().is_empty());
    }

    #[tokio::test]
    async fn test_preview_single_topic() {
        let app = App::new(
            aggregator(StaticSource::new("s").with("forex", &["https://n.com/f"])),
            Arc::new(Dispatcher::new(vec![], Duration::ZERO)),
            None,
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        let messages = app.preview(Some("Forex"), Platform::Discord).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("<https://n.com/f>"));
        assert!(matches!(
            app.preview(Some("sports"), Platform::Discord).await,
            Err(ConfigError::UnknownTopic(_))
        ));
    }

    #[tokio::test]
    async fn test_command_reply_goes_to_originating_chat() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/bot1:t/sendMessage")
                .json_body_includes(r#"{"chat_id": 42}"#);
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"ok":true,"result":{}}"#);
        });
        let http = build_client(Duration::from_secs(5)).unwrap();
        let channel = CommandChannel {
            api: TelegramApi::new(http, &server.base_url(), "1:t"),
            channel_id: -100,
        };
        let app = App::new(
            aggregator(StaticSource::new("s")),
            Arc::new(Dispatcher::new(vec![], Duration::ZERO)),
            Some(channel),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        app.handle_update(update(42, "/help")).await;
        app.handle_update(update(42, "just chatting")).await;
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn test_command_in_broadcast_channel_uses_dispatcher() {
        let server = MockServer::start();
        let http = build_client(Duration::from_secs(5)).unwrap();
        let telegram = Arc::new(RecordingSink::new(Platform::Telegram));
        let app = App::new(
            aggregator(StaticSource::new("s")),
            Arc::new(Dispatcher::new(sinks(&[&telegram]), Duration::ZERO)),
            Some(CommandChannel {
                api: TelegramApi::new(http, &server.base_url(), "1:t"),
                channel_id: -100,
            }),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        app.handle_update(update(-100, "/start")).await;
        assert_eq!(telegram.sent().len(), 1);
        assert!(telegram.sent()[0].starts_with("📰 Welcome"));
    }

    #[tokio::test]
    async fn test_configured_app_fetches_and_posts() {
        use crate::cli::Cli;
        use crate::config::{Endpoints, FileConfig};
        use clap::Parser;

        let server = MockServer::start();
        let news = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/everything").query_param("apiKey", "nk");
            then.status(200).header("content-type", "application/json").body(
                r#"{"status":"ok","totalResults":1,"articles":[
                    {"source":{"name":"Wire"},"title":"Markets move","url":"https://wire.test/a?ref=x",
                     "publishedAt":"2026-10-18T09:00:00Z"}]}"#,
            );
        });
        let discord = server.mock(|when, then| {
            when.method(POST)
                .path_includes("/channels/9/messages")
                .body_includes("wire.test/a>");
            then.status(200).header("content-type", "application/json").body("{}");
        });

        let cli = Cli::parse_from([
            "news_relay",
            "--news-api-key",
            "nk",
            "--discord-bot-token",
            "dt",
            "--discord-channel-id",
            "9",
        ]);
        let file = FileConfig {
            message_delay_ms: Some(0),
            endpoints: Some(Endpoints {
                newsapi: server.base_url(),
                discord: server.base_url(),
                ..Endpoints::default()
            }),
            ..FileConfig::default()
        };
        let config = Config::from_parts(&cli, file).unwrap();
        config.validate_for_posting().unwrap();

        let app = App::from_config(&config).unwrap();
        let reports = app.run_cycle().await;

        assert_eq!(reports, vec![DispatchReport { platform: Platform::Discord, sent: 1, failed: 0 }]);
        // Three topics, two keywords each.
        news.assert_calls(6);
        discord.assert_calls(1);
    }
}
