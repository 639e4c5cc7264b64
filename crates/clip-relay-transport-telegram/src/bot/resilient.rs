//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! Wrappers around Telegram API operations that retry on transient network
//! failures using exponential backoff with jitter.

use crate::config::{
    TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
};
use anyhow::Result;
use clip_relay_core::utils::truncate_str;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardMarkup, Message, MessageId, ParseMode};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, warn};

/// Telegram message length limit with a safety margin
const MAX_MESSAGE_CHARS: usize = 4000;

/// Retry a Telegram API operation with exponential backoff.
///
/// - Initial delay: 500ms
/// - Max delay: 4s
/// - Max retries: 3
///
/// # Errors
///
/// Returns the last error if every attempt fails.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} retries: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}

/// Send a message with automatic retry on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    markup: Option<InlineKeyboardMarkup>,
) -> Result<Message> {
    let text = text.into();
    retry_telegram_operation(|| async {
        let mut req = bot
            .send_message(chat_id, text.clone())
            .parse_mode(ParseMode::Html);
        if let Some(markup) = &markup {
            req = req.reply_markup(markup.clone());
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Edit a message with automatic retry on network failures.
///
/// Returns `Ok(None)` when Telegram reports the text as unchanged.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn edit_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Option<Message>> {
    let text = text.into();
    retry_telegram_operation(|| async {
        let mut req = bot.edit_message_text(chat_id, msg_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        match req.await {
            Ok(msg) => Ok(Some(msg)),
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("message is not modified") {
                    return Ok(None);
                }
                Err(anyhow::anyhow!("Telegram edit error: {e}"))
            }
        }
    })
    .await
}

/// Edit message with graceful degradation and automatic retry.
///
/// Truncates overly long text, retries transient errors and downgrades the
/// expected "not modified" / "not found" errors to debug logs.
///
/// Returns `true` if the message now shows `text`.
pub async fn edit_message_safe_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
) -> bool {
    const ERROR_NOT_FOUND: &str = "message to edit not found";

    let truncated = if text.chars().count() > MAX_MESSAGE_CHARS {
        format!("{}...", truncate_str(text, MAX_MESSAGE_CHARS))
    } else {
        text.to_string()
    };

    match edit_message_resilient(bot, chat_id, msg_id, truncated, Some(ParseMode::Html)).await {
        Ok(Some(_)) => true,
        Ok(None) => {
            debug!("Message update skipped: message is not modified");
            true
        }
        Err(e) => {
            let err_msg = e.to_string();
            if err_msg.contains(ERROR_NOT_FOUND) {
                debug!("Message update skipped: {err_msg}");
            } else {
                warn!("Failed to edit message after retries: {e}");
            }
            false
        }
    }
}

/// Remove the inline keyboard of a message, ignoring failures.
pub async fn clear_keyboard(bot: &Bot, chat_id: ChatId, msg_id: MessageId) {
    if let Err(e) = bot.edit_message_reply_markup(chat_id, msg_id).await {
        debug!(error = %e, "Keyboard removal skipped");
    }
}
