//! Outbound delivery seam.
//!
//! The scheduler and the feedback loop talk to a [`ConfigDelivery`] trait
//! object instead of the Telegram API directly, so drains can run against a
//! recording stand-in in tests.

use crate::config::AppConfig;
use crate::formatter;
use crate::keyboard;
use crate::record::ConfigRecord;
use anyhow::Result;
use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode, Recipient};

/// Coordinates of a delivered post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub channel_id: String,
    pub message_id: i32,
}

#[async_trait]
pub trait ConfigDelivery: Send + Sync {
    /// Post one record to a channel, returning where it landed.
    async fn deliver(&self, channel: &str, record: &ConfigRecord) -> Result<DeliveryReceipt>;

    /// Remove a previously delivered post.
    async fn retract(&self, channel: &str, message_id: i32) -> Result<()>;
}

/// Production implementation: HTML-formatted post with the feedback keyboard
/// attached, sent through the Telegram bot API.
pub struct TelegramDelivery {
    bot: Bot,
    config: AppConfig,
}

impl TelegramDelivery {
    pub fn new(bot: Bot, config: AppConfig) -> Self {
        TelegramDelivery { bot, config }
    }
}

/// Channels arrive either as numeric ids or `@username` handles.
pub fn recipient(channel: &str) -> Recipient {
    match channel.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(channel.to_string()),
    }
}

#[async_trait]
impl ConfigDelivery for TelegramDelivery {
    async fn deliver(&self, channel: &str, record: &ConfigRecord) -> Result<DeliveryReceipt> {
        let text = formatter::channel_post(record, &self.config);
        let sent = self
            .bot
            .send_message(recipient(channel), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard::feedback_buttons(&record.fingerprint))
            .await?;
        Ok(DeliveryReceipt {
            channel_id: channel.to_string(),
            message_id: sent.id.0,
        })
    }

    async fn retract(&self, channel: &str, message_id: i32) -> Result<()> {
        self.bot
            .delete_message(recipient(channel), MessageId(message_id))
            .await?;
        Ok(())
    }
}
