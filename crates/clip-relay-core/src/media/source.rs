//! Validation of user-supplied media links.

use crate::error::JobError;
use std::fmt;
use url::Url;

/// A validated absolute HTTP(S) URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl(Url);

impl SourceUrl {
    /// Parse message text into a source URL.
    ///
    /// # Errors
    ///
    /// Returns `JobError::InvalidInput` when the trimmed text is not an
    /// absolute `http`/`https` URL with a host.
    pub fn parse(text: &str) -> Result<Self, JobError> {
        let trimmed = text.trim();
        let url = Url::parse(trimmed).map_err(|e| JobError::InvalidInput(e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(JobError::InvalidInput(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(JobError::InvalidInput("missing host".to_string()));
        }
        Ok(Self(url))
    }

    /// The URL as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Host part, for logging
    #[must_use]
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
