//! Messaging sinks: "send this text to the configured channel".
//!
//! | Platform | Module | Endpoint |
//! |----------|--------|----------|
//! | Telegram | [`telegram`] | Bot API `sendMessage` (legacy Markdown) |
//! | Discord | [`discord`] | REST `POST /channels/{id}/messages` |
//!
//! Each sink is bound to exactly one destination channel at construction.

pub mod discord;
pub mod telegram;

use crate::error::PlatformSendError;
use crate::models::Platform;
use async_trait::async_trait;

pub use discord::DiscordSink;
pub use telegram::TelegramSink;

/// A destination channel on one messaging platform.
#[async_trait]
pub trait MessageSink: Send + Sync {
    fn platform(&self) -> Platform;

    /// Post one message to the bound channel.
    async fn send(&self, text: &str) -> Result<(), PlatformSendError>;
}
