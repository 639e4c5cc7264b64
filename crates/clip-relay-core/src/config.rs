//! Configuration and settings management
//!
//! Loads relay settings from config files and environment variables and
//! defines the defaults used when a value is absent.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How the options shown to the user are discovered
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResolverStrategy {
    /// Probe the source and list the heights it really offers
    #[default]
    Probe,
    /// Offer a fixed ladder of heights without probing
    Canonical,
}

/// Core relay settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelaySettings {
    /// Scratch root for job directories, created if absent
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Path or name of the yt-dlp executable
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,
    /// Option discovery strategy
    #[serde(default)]
    pub resolver_strategy: ResolverStrategy,
    /// Comma-separated heights offered by the canonical strategy
    #[serde(rename = "canonical_heights")]
    pub canonical_heights_str: Option<String>,
    /// Highest video height offered by the probing strategy
    #[serde(default = "default_max_video_height")]
    pub max_video_height: u32,
    /// Target bitrate of audio-only output
    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,
    /// Upper bound of jobs running at the same time
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Seconds a pending session survives without a choice
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Maximum number of pending sessions kept in memory
    #[serde(default = "default_session_max_capacity")]
    pub session_max_capacity: u64,
    /// Timeout of the metadata probe
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Timeout of the download/transcode phase
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    /// Timeout of the upload phase
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

const fn default_max_video_height() -> u32 {
    1080
}

const fn default_audio_bitrate_kbps() -> u32 {
    192
}

const fn default_max_concurrent_jobs() -> usize {
    4
}

const fn default_session_ttl_secs() -> u64 {
    3600
}

const fn default_session_max_capacity() -> u64 {
    10_000
}

const fn default_probe_timeout_secs() -> u64 {
    60
}

const fn default_download_timeout_secs() -> u64 {
    1800
}

const fn default_upload_timeout_secs() -> u64 {
    1800
}

/// Heights offered when `CANONICAL_HEIGHTS` is not set
pub const DEFAULT_CANONICAL_HEIGHTS: &[u32] = &[720, 480, 360];

/// Maximum number of video options shown in one keyboard
pub const MAX_VIDEO_OPTIONS: usize = 8;

/// Build the layered configuration shared by every settings struct.
///
/// Sources, later ones winning: `config/default`, `config/{RUN_MODE}`,
/// `config/local`, `APP__*` variables, plain environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a source cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Environment::default() maps UPPER_SNAKE_CASE to snake_case; empty values count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl RelaySettings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Heights offered by the canonical strategy, highest first
    #[must_use]
    pub fn canonical_heights(&self) -> Vec<u32> {
        let mut heights: Vec<u32> = self
            .canonical_heights_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|h| h.trim_end_matches(['p', 'P']).parse::<u32>().ok())
                    .filter(|h| *h > 0)
                    .collect()
            })
            .unwrap_or_default();

        if heights.is_empty() {
            return DEFAULT_CANONICAL_HEIGHTS.to_vec();
        }
        heights.sort_unstable_by(|a, b| b.cmp(a));
        heights.dedup();
        heights
    }

    /// Timeout of the metadata probe
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Timeout of the download/transcode phase
    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Timeout of the upload phase
    #[must_use]
    pub const fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    /// Session time-to-live
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            ytdlp_path: default_ytdlp_path(),
            resolver_strategy: ResolverStrategy::default(),
            canonical_heights_str: None,
            max_video_height: default_max_video_height(),
            audio_bitrate_kbps: default_audio_bitrate_kbps(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            session_ttl_secs: default_session_ttl_secs(),
            session_max_capacity: default_session_max_capacity(),
            probe_timeout_secs: default_probe_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
        }
    }
}
