//! Telegram transport settings.

use clip_relay_core::config::RelaySettings;
use config::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use url::Url;

/// Initial delay before retrying a failed Telegram API call (milliseconds).
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound of the retry delay (milliseconds).
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Number of retries after the first attempt.
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

/// Upload limit of the public Bot API.
pub const CLOUD_UPLOAD_LIMIT_BYTES: u64 = 50 * 1024 * 1024;
/// Upload limit of a self-hosted Bot API server.
pub const LOCAL_UPLOAD_LIMIT_BYTES: u64 = 2000 * 1024 * 1024;

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelegramSettings {
    /// Telegram Bot API token (`BOT_TOKEN`).
    pub bot_token: String,
    /// Application id, only meaningful for a self-hosted Bot API server.
    pub api_id: Option<String>,
    /// Application hash, only meaningful for a self-hosted Bot API server.
    pub api_hash: Option<String>,
    /// Base URL of a self-hosted Bot API server.
    pub bot_api_url: Option<String>,
    /// Address the liveness endpoint binds to.
    #[serde(default = "default_health_host")]
    pub health_host: IpAddr,
    /// Port of the liveness endpoint.
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

const fn default_health_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_health_port() -> u16 {
    8080
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_id: None,
            api_hash: None,
            bot_api_url: None,
            health_host: default_health_host(),
            health_port: default_health_port(),
        }
    }
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or `BOT_TOKEN` is empty.
    pub fn new() -> Result<Self, ConfigError> {
        let settings: Self = clip_relay_core::config::build_config()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check values that cannot be expressed by serde defaults.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::Message("BOT_TOKEN must not be empty".into()));
        }
        self.bot_api_url()?;
        Ok(())
    }

    /// Parsed `BOT_API_URL`, if set.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the value is not an absolute URL.
    pub fn bot_api_url(&self) -> Result<Option<Url>, ConfigError> {
        self.bot_api_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| ConfigError::Message(format!("BOT_API_URL is invalid: {e}")))
            })
            .transpose()
    }

    /// Whether `API_ID`/`API_HASH` are both present.
    #[must_use]
    pub fn has_api_credentials(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.api_id) && present(&self.api_hash)
    }

    /// Largest file the configured Bot API accepts.
    #[must_use]
    pub fn max_upload_bytes(&self) -> u64 {
        match self.bot_api_url() {
            Ok(Some(_)) => LOCAL_UPLOAD_LIMIT_BYTES,
            _ => CLOUD_UPLOAD_LIMIT_BYTES,
        }
    }

    /// Socket address of the liveness endpoint.
    #[must_use]
    pub const fn health_addr(&self) -> SocketAddr {
        SocketAddr::new(self.health_host, self.health_port)
    }
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Relay settings shared across transport handlers.
    pub relay: Arc<RelaySettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(relay: RelaySettings, telegram: TelegramSettings) -> Self {
        Self {
            relay: Arc::new(relay),
            telegram: Arc::new(telegram),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TelegramSettings {
        TelegramSettings {
            bot_token: "123456789:dummy".to_string(),
            ..TelegramSettings::default()
        }
    }

    #[test]
    fn defaults_target_public_api() {
        let settings = settings();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.max_upload_bytes(), CLOUD_UPLOAD_LIMIT_BYTES);
        assert_eq!(settings.health_addr().to_string(), "0.0.0.0:8080");
        assert!(!settings.has_api_credentials());
    }

    #[test]
    fn self_hosted_api_raises_limit() {
        let mut settings = settings();
        settings.bot_api_url = Some("http://127.0.0.1:8081".to_string());
        settings.api_id = Some("12345".to_string());
        settings.api_hash = Some("0123456789abcdef".to_string());
        assert!(settings.validate().is_ok());
        assert!(settings.has_api_credentials());
        assert_eq!(settings.max_upload_bytes(), LOCAL_UPLOAD_LIMIT_BYTES);
    }

    #[test]
    fn rejects_empty_token_and_bad_url() {
        let mut settings = settings();
        settings.bot_token = "  ".to_string();
        assert!(settings.validate().is_err());

        let mut settings = self::settings();
        settings.bot_api_url = Some("not a url".to_string());
        assert!(settings.validate().is_err());

        settings.bot_api_url = Some(String::new());
        assert!(settings.validate().is_ok());
    }
}
