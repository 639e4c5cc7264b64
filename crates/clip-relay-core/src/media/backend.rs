//! Media backend abstraction.
//!
//! Resolvers probe through it and jobs fetch through it, so a different
//! extraction tool only needs a new implementation of [`MediaBackend`].

use super::{MediaKind, Selector, SourceUrl};
use crate::error::JobError;
use crate::progress::ProgressReporter;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// File stem of every job output; the extension follows the media kind
pub const OUTPUT_STEM: &str = "media";

/// Metadata learned by probing a source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaInfo {
    /// Title, if the source exposes one
    pub title: Option<String>,
    /// Distinct heights of streams that carry video
    pub heights: Vec<u32>,
}

/// One download/transcode invocation
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Source to fetch
    pub source: SourceUrl,
    /// Requested output form
    pub selector: Selector,
    /// Job-owned scratch directory the backend writes into
    pub output_dir: PathBuf,
}

impl FetchRequest {
    /// Create a request writing into `output_dir`
    #[must_use]
    pub fn new(source: SourceUrl, selector: Selector, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            selector,
            output_dir: output_dir.into(),
        }
    }

    /// Media kind of the produced file
    #[must_use]
    pub const fn kind(&self) -> MediaKind {
        self.selector.kind()
    }

    /// Where the finished file lands. Derived from the template, never
    /// discovered by listing the directory.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{OUTPUT_STEM}.{}", self.kind().extension()))
    }

    /// Output template in yt-dlp syntax
    #[must_use]
    pub fn output_template(&self) -> PathBuf {
        self.output_dir.join(format!("{OUTPUT_STEM}.%(ext)s"))
    }

    /// The scratch directory
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// External media-extraction/transcoding facility
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Inspect a source without downloading it
    async fn probe(&self, source: &SourceUrl) -> Result<MediaInfo, JobError>;

    /// Download and transcode into [`FetchRequest::output_path`], reporting
    /// download progress through `progress`
    async fn fetch(&self, request: &FetchRequest, progress: &ProgressReporter)
        -> Result<(), JobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_follows_selector_kind() -> Result<(), JobError> {
        let source = SourceUrl::parse("https://example.com/watch?v=abc")?;
        let video = FetchRequest::new(source.clone(), Selector::Video { height: 720 }, "/scratch/j1");
        assert_eq!(video.output_path(), PathBuf::from("/scratch/j1/media.mp4"));
        assert_eq!(
            video.output_template(),
            PathBuf::from("/scratch/j1/media.%(ext)s")
        );

        let audio = FetchRequest::new(source, Selector::AudioOnly, "/scratch/j2");
        assert_eq!(audio.output_path(), PathBuf::from("/scratch/j2/media.mp3"));
        Ok(())
    }
}
