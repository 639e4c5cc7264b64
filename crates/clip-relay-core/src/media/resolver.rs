//! Option discovery.
//!
//! A [`FormatResolver`] turns a source into the list of selectors shown to the
//! user. Whatever the strategy, the list ends with exactly one audio-only
//! entry and is never empty.

use super::backend::MediaBackend;
use super::selector::finalize_options;
use super::{Selector, SourceUrl};
use crate::config::{RelaySettings, ResolverStrategy, MAX_VIDEO_OPTIONS};
use crate::error::{JobError, JobPhase};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Options offered for one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    /// Title when known; used in the upload caption
    pub title: Option<String>,
    /// Video selectors highest first, then audio-only
    pub options: Vec<Selector>,
}

/// Strategy producing the selectable options for a source
#[async_trait]
pub trait FormatResolver: Send + Sync {
    /// Strategy name for logs
    fn name(&self) -> &'static str;

    /// Resolve the options for `source`
    async fn resolve(&self, source: &SourceUrl) -> Result<ResolvedMedia, JobError>;
}

/// Probes the source and offers the heights it really has
pub struct ProbingResolver {
    backend: Arc<dyn MediaBackend>,
    max_height: u32,
    timeout: Duration,
}

impl ProbingResolver {
    /// Create a probing resolver
    #[must_use]
    pub fn new(backend: Arc<dyn MediaBackend>, max_height: u32, timeout: Duration) -> Self {
        Self {
            backend,
            max_height,
            timeout,
        }
    }

    fn options_from_heights(&self, heights: &[u32]) -> Vec<Selector> {
        let mut offered: Vec<u32> = heights
            .iter()
            .copied()
            .filter(|h| *h > 0 && *h <= self.max_height)
            .collect();
        offered.sort_unstable_by(|a, b| b.cmp(a));
        offered.dedup();
        offered.truncate(MAX_VIDEO_OPTIONS);
        finalize_options(offered)
    }
}

#[async_trait]
impl FormatResolver for ProbingResolver {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn resolve(&self, source: &SourceUrl) -> Result<ResolvedMedia, JobError> {
        let info = tokio::time::timeout(self.timeout, self.backend.probe(source))
            .await
            .map_err(|_| JobError::BackendTimeout {
                phase: JobPhase::Probe,
            })??;

        let options = self.options_from_heights(&info.heights);
        info!(
            backend = self.backend.name(),
            host = %source.host(),
            probed = info.heights.len(),
            offered = options.len(),
            "Resolved media options"
        );

        Ok(ResolvedMedia {
            title: info.title,
            options,
        })
    }
}

/// Offers a fixed height ladder without touching the network
#[derive(Debug, Clone)]
pub struct CanonicalResolver {
    heights: Vec<u32>,
}

impl CanonicalResolver {
    /// Create a resolver offering `heights`
    #[must_use]
    pub fn new(heights: Vec<u32>) -> Self {
        Self { heights }
    }
}

#[async_trait]
impl FormatResolver for CanonicalResolver {
    fn name(&self) -> &'static str {
        "canonical"
    }

    async fn resolve(&self, source: &SourceUrl) -> Result<ResolvedMedia, JobError> {
        debug!(host = %source.host(), "Offering canonical options");
        Ok(ResolvedMedia {
            title: None,
            options: finalize_options(self.heights.iter().copied()),
        })
    }
}

/// Build the resolver selected by `settings`
#[must_use]
pub fn resolver_from_settings(
    settings: &RelaySettings,
    backend: Arc<dyn MediaBackend>,
) -> Arc<dyn FormatResolver> {
    match settings.resolver_strategy {
        ResolverStrategy::Probe => Arc::new(ProbingResolver::new(
            backend,
            settings.max_video_height,
            settings.probe_timeout(),
        )),
        ResolverStrategy::Canonical => {
            Arc::new(CanonicalResolver::new(settings.canonical_heights()))
        }
    }
}
