//! Outbound notification contract and the Telegram implementation.
//!
//! Delivery is best-effort end to end: the pipeline logs failures and
//! moves on, and an item's status never depends on anything here.

use crate::error::SnapflowError;
use crate::types::ProcessedItem;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Telegram rejects photo captions longer than this
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one finalized item to the notification channel
    async fn notify(&self, item: &ProcessedItem) -> Result<(), SnapflowError>;
}

/// Sends the screenshot plus its analysis to a Telegram chat,
/// with follow-up actions attached as an inline keyboard
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Result<Self, SnapflowError> {
        Self::with_base_url(bot_token, chat_id, TELEGRAM_API_URL.to_string())
    }

    /// Point the client at a different host (used by HTTP-stub tests)
    pub fn with_base_url(
        bot_token: String,
        chat_id: String,
        base_url: String,
    ) -> Result<Self, SnapflowError> {
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            bot_token,
            chat_id,
            base_url,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, item: &ProcessedItem) -> Result<(), SnapflowError> {
        let caption = build_caption(item);
        let keyboard = build_keyboard(item);

        let photo = reqwest::multipart::Part::bytes(item.image_bytes.as_ref().clone())
            .file_name(item.name.clone())
            .mime_str(&item.mime_type)
            .map_err(|e| SnapflowError::Notification(format!("invalid mime type: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption)
            .text("parse_mode", "HTML")
            .text("reply_markup", keyboard.to_string())
            .part("photo", photo);

        let response = self
            .client
            .post(format!(
                "{}/bot{}/sendPhoto",
                self.base_url, self.bot_token
            ))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SnapflowError::Notification(format!("send failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SnapflowError::Notification(format!(
                "Telegram returned {}: {}",
                status, body
            )));
        }

        debug!(id = %item.id, "Notification delivered");
        Ok(())
    }
}

/// HTML caption: source header plus the summary, or the failure detail
/// when analysis never produced one
fn build_caption(item: &ProcessedItem) -> String {
    let header = format!(
        "<b>{} {}</b> <i>{}</i>",
        item.source.emoji(),
        item.source.label(),
        item.timestamp.format("%H:%M:%S")
    );

    let body = match (&item.analysis_summary, &item.error_detail) {
        (Some(summary), _) => format!("<b>AI Analysis:</b>\n\n{}", summary),
        (None, Some(detail)) => format!("<b>Analysis failed:</b>\n\n{}", detail),
        (None, None) => "<b>AI Analysis:</b>\n\n(no summary)".to_string(),
    };

    clamp_caption(format!("{}\n\n{}", header, body))
}

fn clamp_caption(caption: String) -> String {
    if caption.chars().count() <= TELEGRAM_CAPTION_LIMIT {
        caption
    } else {
        caption.chars().take(TELEGRAM_CAPTION_LIMIT).collect()
    }
}

/// Follow-up affordances. The webpage action only appears when the
/// content pass actually saw a URL.
fn build_keyboard(item: &ProcessedItem) -> serde_json::Value {
    let mut rows = vec![
        vec![json!({
            "text": "🔬 Research Papers",
            "callback_data": format!("arxiv_research_{}", item.id)
        })],
        vec![json!({
            "text": "🧠 Deep Research",
            "callback_data": format!("deep_research_{}", item.id)
        })],
    ];

    let has_webpage = item
        .content
        .as_ref()
        .and_then(|c| c.webpage_url.as_ref())
        .is_some();
    if has_webpage {
        rows.push(vec![json!({
            "text": "🌐 Webpage Content",
            "callback_data": format!("full_webpage_{}", item.id)
        })]);
    }

    json!({ "inline_keyboard": rows })
}
