/// Command, link and button handlers
pub mod handlers;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;
/// Status sink and uploader bound to one chat
pub mod transport;
/// View layer for UI components (keyboards, messages)
pub mod views;

pub use transport::{TelegramStatusSink, TelegramUploader};
