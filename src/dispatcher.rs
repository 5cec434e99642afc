//! Deliver formatted messages to the configured platforms.
//!
//! One [`MessageSink`] per platform. Each platform has its own send lock so a
//! scheduled broadcast and an on-demand post never interleave their batches
//! in the same channel; the two platforms proceed independently.
//!
//! Per-message behavior:
//! - Messages go out in order with `message_delay` between them
//! - A rate-limit answer waits `retry_after` (capped) and retries once
//! - Channel-not-found and forbidden end the attempt for that platform; the
//!   remaining messages are reported as [`PlatformSendError::Aborted`]

use crate::error::PlatformSendError;
use crate::formatter;
use crate::models::{NewsSet, Platform};
use crate::sinks::MessageSink;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Outcome of posting one batch to one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub platform: Platform,
    pub sent: usize,
    pub failed: usize,
}

impl DispatchReport {
    fn from_results(platform: Platform, results: &[Result<(), PlatformSendError>]) -> Self {
        let sent = results.iter().filter(|r| r.is_ok()).count();
        Self {
            platform,
            sent,
            failed: results.len() - sent,
        }
    }
}

struct Route {
    sink: Arc<dyn MessageSink>,
    lock: Mutex<()>,
}

pub struct Dispatcher {
    routes: Vec<Route>,
    message_delay: Duration,
    max_rate_limit_wait: Duration,
}

impl Dispatcher {
    /// Build a dispatcher; a later sink for an already-routed platform is ignored.
    pub fn new(sinks: Vec<Arc<dyn MessageSink>>, message_delay: Duration) -> Self {
        let mut routes: Vec<Route> = Vec::new();
        for sink in sinks {
            if routes.iter().any(|r| r.sink.platform() == sink.platform()) {
                warn!(platform = %sink.platform(), "Duplicate sink for platform; ignoring");
                continue;
            }
            routes.push(Route {
                sink,
                lock: Mutex::new(()),
            });
        }
        Self {
            routes,
            message_delay,
            max_rate_limit_wait: Duration::from_secs(30),
        }
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.routes.iter().map(|r| r.sink.platform()).collect()
    }

    fn route(&self, platform: Platform) -> Option<&Route> {
        self.routes.iter().find(|r| r.sink.platform() == platform)
    }

    /// Post messages, in order, to the platform's channel.
    ///
    /// Returns one result per input message.
    #[instrument(level = "info", skip(self, messages), fields(count = messages.len()))]
    pub async fn post(
        &self,
        platform: Platform,
        messages: &[String],
    ) -> Vec<Result<(), PlatformSendError>> {
        let Some(route) = self.route(platform) else {
            warn!(%platform, "No sink configured for platform");
            return messages.iter().map(|_| Err(PlatformSendError::NotConfigured)).collect();
        };

        let _guard = route.lock.lock().await;
        let mut results = Vec::with_capacity(messages.len());
        let mut aborted = false;

        for (i, message) in messages.iter().enumerate() {
            if aborted {
                results.push(Err(PlatformSendError::Aborted));
                continue;
            }
            if i > 0 && !self.message_delay.is_zero() {
                sleep(self.message_delay).await;
            }

            let mut outcome = route.sink.send(message).await;
            if let Err(PlatformSendError::RateLimited { retry_after }) = &outcome {
                let wait = (*retry_after).min(self.max_rate_limit_wait);
                warn!(%platform, index = i, ?wait, "Rate limited; retrying message once");
                sleep(wait).await;
                outcome = route.sink.send(message).await;
            }

            match &outcome {
                Ok(()) => {}
                Err(e) if e.is_terminal() => {
                    error!(%platform, index = i, error = %e, "Terminal send error; abandoning remaining messages");
                    aborted = true;
                }
                Err(e) => warn!(%platform, index = i, error = %e, "Message send failed"),
            }
            results.push(outcome);
        }

        let report = DispatchReport::from_results(platform, &results);
        info!(%platform, sent = report.sent, failed = report.failed, "Post attempt finished");
        results
    }

    /// Format and post news to every configured platform concurrently.
    ///
    /// A failure on one platform never affects the other.
    #[instrument(level = "info", skip_all)]
    pub async fn broadcast(&self, news: &NewsSet) -> Vec<DispatchReport> {
        let posts = self.routes.iter().map(|route| async move {
            let platform = route.sink.platform();
            let messages = formatter::format(news, platform);
            if messages.is_empty() {
                info!(%platform, "Nothing to post");
                return DispatchReport::from_results(platform, &[]);
            }
            let results = self.post(platform, &messages).await;
            DispatchReport::from_results(platform, &results)
        });
        join_all(posts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Article;
    use crate::sinks::testing::RecordingSink;

    fn erase(sink: &Arc<RecordingSink>) -> Arc<dyn MessageSink> {
        sink.clone()
    }

    fn messages(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[tokio::test]
    async fn test_post_preserves_order() {
        let sink = Arc::new(RecordingSink::new(Platform::Discord));
        let dispatcher = Dispatcher::new(vec![erase(&sink)], Duration::ZERO);

        let results = dispatcher.post(Platform::Discord, &messages("m", 3)).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(sink.sent(), messages("m", 3));
    }

    #[tokio::test]
    async fn test_terminal_error_aborts_remaining_messages() {
        let sink = Arc::new(
            RecordingSink::new(Platform::Telegram).failing_with(vec![PlatformSendError::Forbidden]),
        );
        let dispatcher = Dispatcher::new(vec![erase(&sink)], Duration::ZERO);

        let results = dispatcher.post(Platform::Telegram, &messages("m", 3)).await;
        assert!(matches!(results[0], Err(PlatformSendError::Forbidden)));
        assert!(matches!(results[1], Err(PlatformSendError::Aborted)));
        assert!(matches!(results[2], Err(PlatformSendError::Aborted)));
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_non_terminal_error_continues() {
        let sink = Arc::new(RecordingSink::new(Platform::Discord).failing_with(vec![
            PlatformSendError::Http { status: 500, message: "oops".into() },
        ]));
        let dispatcher = Dispatcher::new(vec![erase(&sink)], Duration::ZERO);

        let results = dispatcher.post(Platform::Discord, &messages("m", 2)).await;
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
        assert_eq!(sink.sent(), vec!["m2".to_string()]);
    }

    #[tokio::test]
    async fn test_rate_limited_message_is_retried_once() {
        let sink = Arc::new(RecordingSink::new(Platform::Discord).failing_with(vec![
            PlatformSendError::RateLimited { retry_after: Duration::from_millis(5) },
        ]));
        let dispatcher = Dispatcher::new(vec![erase(&sink)], Duration::ZERO);

        let results = dispatcher.post(Platform::Discord, &messages("m", 2)).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(sink.sent(), messages("m", 2));
    }

    #[tokio::test]
    async fn test_unconfigured_platform() {
        let dispatcher = Dispatcher::new(vec![], Duration::ZERO);
        let results = dispatcher.post(Platform::Telegram, &messages("m", 2)).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| matches!(r, Err(PlatformSendError::NotConfigured))));
    }

    #[tokio::test]
    async fn test_concurrent_posts_do_not_interleave() {
        let sink = Arc::new(RecordingSink::new(Platform::Discord));
        let dispatcher = Dispatcher::new(vec![erase(&sink)], Duration::from_millis(5));

        let a = messages("a", 3);
        let b = messages("b", 3);
        let _ = tokio::join!(
            dispatcher.post(Platform::Discord, &a),
            dispatcher.post(Platform::Discord, &b),
        );

        let sent = sink.sent();
        assert_eq!(sent.len(), 6);
        let first_batch = &sent[..3];
        assert!(
            first_batch.iter().all(|m| m.starts_with('a')) || first_batch.iter().all(|m| m.starts_with('b')),
            "interleaved: {sent:?}"
        );
    }

    #[tokio::test]
    async fn test_broadcast_isolates_platforms() {
        let telegram = Arc::new(
            RecordingSink::new(Platform::Telegram).failing_with(vec![PlatformSendError::ChannelNotFound]),
        );
        let discord = Arc::new(RecordingSink::new(Platform::Discord));
        let dispatcher = Dispatcher::new(vec![erase(&telegram), erase(&discord)], Duration::ZERO);

        let mut news = NewsSet::new();
        news.insert(
            "cybersecurity",
            vec![Article::new(Some("Breach at Acme"), Some("https://n.com/a?utm=1"), Some("N"), None).unwrap()],
        );
        news.insert("forex", vec![]);

        let reports = dispatcher.broadcast(&news).await;
        assert_eq!(reports.len(), 2);
        let tg = reports.iter().find(|r| r.platform == Platform::Telegram).unwrap();
        let dc = reports.iter().find(|r| r.platform == Platform::Discord).unwrap();
        assert_eq!((tg.sent, tg.failed), (0, 1));
        assert_eq!((dc.sent, dc.failed), (1, 0));
        assert!(discord.sent()[0].contains("<https://n.com/a>"));
    }

    #[tokio::test]
    async fn test_broadcast_with_no_news_posts_nothing() {
        let discord = Arc::new(RecordingSink::new(Platform::Discord));
        let dispatcher = Dispatcher::new(vec![erase(&discord)], Duration::ZERO);

        let reports = dispatcher.broadcast(&NewsSet::new()).await;
        assert_eq!(reports, vec![DispatchReport { platform: Platform::Discord, sent: 0, failed: 0 }]);
        assert!(discord.sent().is_empty());
    }
}
