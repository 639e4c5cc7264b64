//! Job runner
//!
//! Runs one confirmed choice: waits for a worker permit, fetches into a
//! job-owned scratch directory, uploads the result and removes the directory
//! on every exit path. The final status is sent only after the progress
//! runtime has drained, so no late progress edit can overwrite it.

use super::scratch::ScratchDir;
use crate::config::RelaySettings;
use crate::error::{JobError, JobPhase};
use crate::media::{FetchRequest, MediaBackend, MediaKind, Selector, SourceUrl};
use crate::progress::{
    spawn_progress_runtime, JobStatus, ProgressReporter, ProgressRuntimeConfig, StatusSink,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Upper bound for the progress runtime to finish after a job returns
const RUNTIME_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// One confirmed choice to execute
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Source link
    pub source: SourceUrl,
    /// Chosen output form
    pub selector: Selector,
    /// Title learned at resolve time
    pub title: Option<String>,
}

/// A produced file ready for upload
#[derive(Debug, Clone)]
pub struct MediaFile {
    /// Location inside the job's scratch directory
    pub path: PathBuf,
    /// Which upload method applies
    pub kind: MediaKind,
    /// Caption attached to the upload
    pub caption: String,
    /// Title, used as the audio track title
    pub title: Option<String>,
    /// File size in bytes
    pub size: u64,
}

/// Summary of a finished job
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Job identity, also the scratch directory name
    pub job_id: Uuid,
    /// Kind of media delivered
    pub kind: MediaKind,
    /// Bytes uploaded
    pub bytes: u64,
    /// Wall time including queueing
    pub elapsed: Duration,
}

/// Destination of produced files
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Upload `media`, reporting progress through `progress`
    async fn upload(&self, media: &MediaFile, progress: &ProgressReporter) -> Result<(), JobError>;
}

/// Caption of an uploaded file
#[must_use]
pub fn build_caption(title: Option<&str>, selector: Selector) -> String {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => format!("✅ {title} ({})", selector.label()),
        None => format!("✅ Your file ({})", selector.label()),
    }
}

/// Executes jobs on a bounded pool of workers
pub struct JobRunner {
    backend: Arc<dyn MediaBackend>,
    scratch_root: PathBuf,
    permits: Semaphore,
    download_timeout: Duration,
    upload_timeout: Duration,
    progress_config: ProgressRuntimeConfig,
}

impl JobRunner {
    /// Create a runner with `max_concurrent` workers
    #[must_use]
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        scratch_root: impl Into<PathBuf>,
        max_concurrent: usize,
        download_timeout: Duration,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            scratch_root: scratch_root.into(),
            permits: Semaphore::new(max_concurrent.max(1)),
            download_timeout,
            upload_timeout,
            progress_config: ProgressRuntimeConfig::default(),
        }
    }

    /// Runner configured from settings
    #[must_use]
    pub fn from_settings(settings: &RelaySettings, backend: Arc<dyn MediaBackend>) -> Self {
        Self::new(
            backend,
            settings.download_dir.clone(),
            settings.max_concurrent_jobs,
            settings.download_timeout(),
            settings.upload_timeout(),
        )
    }

    /// Replace the progress runtime configuration
    #[must_use]
    pub const fn with_progress_config(mut self, config: ProgressRuntimeConfig) -> Self {
        self.progress_config = config;
        self
    }

    /// Root under which job directories are created
    #[must_use]
    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Run one job to completion and report its final status to `sink`.
    ///
    /// # Errors
    ///
    /// Returns the [`JobError`] that ended the job; the same error has already
    /// been sent to `sink` as [`JobStatus::Failed`].
    pub async fn run(
        &self,
        request: JobRequest,
        uploader: &dyn MediaUploader,
        sink: Arc<dyn StatusSink>,
    ) -> Result<JobOutcome, JobError> {
        let job_id = Uuid::new_v4();
        let started = Instant::now();
        let kind = request.selector.kind();

        let (tx, rx) = self.progress_config.channel();
        let mut runtime = spawn_progress_runtime(sink.clone(), rx, self.progress_config);
        let reporter = ProgressReporter::new(tx, kind);

        info!(
            job_id = %job_id,
            selector = %request.selector,
            host = %request.source.host(),
            "Job accepted"
        );

        let result = self
            .execute(job_id, &request, uploader, &reporter)
            .await
            .map(|bytes| JobOutcome {
                job_id,
                kind,
                bytes,
                elapsed: started.elapsed(),
            });
        drop(reporter);

        if tokio::time::timeout(RUNTIME_DRAIN_TIMEOUT, &mut runtime)
            .await
            .is_err()
        {
            warn!(job_id = %job_id, "Progress runtime did not drain in time, aborting it");
            runtime.abort();
        }

        let final_status = match &result {
            Ok(outcome) => {
                info!(
                    job_id = %job_id,
                    bytes = outcome.bytes,
                    elapsed_ms = outcome.elapsed.as_millis(),
                    "Job completed"
                );
                JobStatus::Completed { kind }
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Job failed");
                JobStatus::Failed(e.clone())
            }
        };

        if let Err(e) = sink.update_status(&final_status).await {
            warn!(job_id = %job_id, error = %e, "Final status update failed");
        }

        result
    }

    async fn acquire_permit(
        &self,
        reporter: &ProgressReporter,
    ) -> Result<SemaphorePermit<'_>, JobError> {
        match self.permits.try_acquire() {
            Ok(permit) => Ok(permit),
            Err(TryAcquireError::NoPermits) => {
                reporter.on_queued();
                self.permits
                    .acquire()
                    .await
                    .map_err(|_| JobError::BackendFailure("job pool closed".to_string()))
            }
            Err(TryAcquireError::Closed) => {
                Err(JobError::BackendFailure("job pool closed".to_string()))
            }
        }
    }

    async fn execute(
        &self,
        job_id: Uuid,
        request: &JobRequest,
        uploader: &dyn MediaUploader,
        reporter: &ProgressReporter,
    ) -> Result<u64, JobError> {
        let _permit = self.acquire_permit(reporter).await?;
        reporter.on_started();

        let scratch = ScratchDir::create(&self.scratch_root, job_id).await?;
        let result = self
            .fetch_and_upload(scratch.path(), request, uploader, reporter)
            .await;
        scratch.remove().await;
        result
    }

    async fn fetch_and_upload(
        &self,
        dir: &Path,
        request: &JobRequest,
        uploader: &dyn MediaUploader,
        reporter: &ProgressReporter,
    ) -> Result<u64, JobError> {
        let fetch = FetchRequest::new(request.source.clone(), request.selector, dir);

        tokio::time::timeout(self.download_timeout, self.backend.fetch(&fetch, reporter))
            .await
            .map_err(|_| JobError::BackendTimeout {
                phase: JobPhase::Download,
            })??;

        let path = fetch.output_path();
        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                return Err(JobError::BackendFailure(format!(
                    "{} finished without producing {}",
                    self.backend.name(),
                    path.file_name()
                        .map_or_else(String::new, |n| n.to_string_lossy().into_owned())
                )))
            }
        };
        debug!(path = %path.display(), size, "Backend output located");

        let media = MediaFile {
            path,
            kind: fetch.kind(),
            caption: build_caption(request.title.as_deref(), request.selector),
            title: request.title.clone(),
            size,
        };

        tokio::time::timeout(self.upload_timeout, uploader.upload(&media, reporter))
            .await
            .map_err(|_| JobError::BackendTimeout {
                phase: JobPhase::Upload,
            })??;

        Ok(size)
    }
}
