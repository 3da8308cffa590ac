//! Outbound message contract.
//!
//! The core renders plain text and a button layout; delivery (and retries)
//! belong to whatever transport implements [`MessageSender`].

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub enum ButtonAction {
    Url(String),
    Callback(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Button {
    pub text: String,
    pub action: ButtonAction,
}

impl Button {
    pub fn url(text: &str, url: String) -> Self {
        Self {
            text: text.to_string(),
            action: ButtonAction::Url(url),
        }
    }

    pub fn callback(text: &str, data: String) -> Self {
        Self {
            text: text.to_string(),
            action: ButtonAction::Callback(data),
        }
    }
}

/// A rendered message ready for delivery. Rows of buttons, Telegram-style.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub chat_id: String,
    pub text: String,
    pub buttons: Vec<Vec<Button>>,
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()>;
}

/// Fallback sender that writes messages to the log. Stands in while no
/// chat transport is wired up.
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()> {
        tracing::info!("-> [{}]\n{}", message.chat_id, message.text);
        Ok(())
    }
}
