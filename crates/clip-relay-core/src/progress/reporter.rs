//! Progress reporter.
//!
//! Cheap to clone and safe to call from synchronous contexts such as
//! `AsyncRead::poll_read`. Events are coalesced per phase and pushed with
//! `try_send`, so a slow sink can never stall a download or an upload.

use super::state::JobStatus;
use crate::media::MediaKind;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

/// Marker for "no percentage reported yet"
const NOT_REPORTED: u8 = u8::MAX;

#[derive(Debug)]
struct Shared {
    download: AtomicU8,
    upload: AtomicU8,
    processing: AtomicBool,
}

/// Forwards job progress to the progress runtime
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<JobStatus>>,
    kind: MediaKind,
    shared: Arc<Shared>,
}

impl ProgressReporter {
    /// Create a reporter sending into `tx`
    #[must_use]
    pub fn new(tx: mpsc::Sender<JobStatus>, kind: MediaKind) -> Self {
        Self::build(Some(tx), kind)
    }

    /// Reporter that drops every event
    #[must_use]
    pub fn disabled(kind: MediaKind) -> Self {
        Self::build(None, kind)
    }

    fn build(tx: Option<mpsc::Sender<JobStatus>>, kind: MediaKind) -> Self {
        Self {
            tx,
            kind,
            shared: Arc::new(Shared {
                download: AtomicU8::new(NOT_REPORTED),
                upload: AtomicU8::new(NOT_REPORTED),
                processing: AtomicBool::new(false),
            }),
        }
    }

    /// Media kind of the job this reporter belongs to
    #[must_use]
    pub const fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Integer percentage of `done` over `total`, clamped to 100.
    /// Unknown (`0`) totals yield `None`.
    #[must_use]
    pub fn percent(done: u64, total: u64) -> Option<u8> {
        if total == 0 {
            return None;
        }
        let pct = (u128::from(done) * 100 / u128::from(total)).min(100);
        u8::try_from(pct).ok()
    }

    /// The job is waiting for a worker
    pub fn on_queued(&self) {
        self.send(JobStatus::Queued);
    }

    /// A worker picked the job up
    pub fn on_started(&self) {
        self.send(JobStatus::Starting);
    }

    /// Backend download progress in bytes
    pub fn on_download_progress(&self, done: u64, total: u64) {
        if let Some(pct) = Self::percent(done, total) {
            if self.shared.download.swap(pct, Ordering::Relaxed) != pct {
                self.send(JobStatus::Downloading { percent: pct });
            }
        }
    }

    /// The backend started merging or transcoding; reported once per job
    pub fn on_postprocessing(&self) {
        if !self.shared.processing.swap(true, Ordering::Relaxed) {
            self.send(JobStatus::Processing);
        }
    }

    /// Upload progress in bytes
    pub fn on_upload_progress(&self, done: u64, total: u64) {
        if let Some(pct) = Self::percent(done, total) {
            if self.shared.upload.swap(pct, Ordering::Relaxed) != pct {
                self.send(JobStatus::Uploading {
                    kind: self.kind,
                    percent: pct,
                });
            }
        }
    }

    fn send(&self, status: JobStatus) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(status) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(status)) => {
                trace!(?status, "Progress channel full, dropping event");
            }
        }
    }
}
