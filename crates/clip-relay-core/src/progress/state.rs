use crate::error::JobError;
use crate::media::MediaKind;

/// Status of one job as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Waiting for a free worker
    Queued,
    /// Worker acquired, backend starting
    Starting,
    /// Backend download in progress
    Downloading {
        /// Integer percentage, 0..=100
        percent: u8,
    },
    /// Merging or transcoding after the download
    Processing,
    /// Upload to the destination in progress
    Uploading {
        /// Kind of media being uploaded
        kind: MediaKind,
        /// Integer percentage, 0..=100
        percent: u8,
    },
    /// Job finished and the file was delivered
    Completed {
        /// Kind of media delivered
        kind: MediaKind,
    },
    /// Job failed
    Failed(JobError),
}

impl JobStatus {
    /// Whether no further status can follow
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed(_))
    }
}

/// Latest status folded from reporter events
#[derive(Debug, Clone, Default)]
pub struct ProgressState {
    /// Most recent status, if any event arrived
    pub current: Option<JobStatus>,
    /// Number of events folded so far
    pub events: usize,
}

impl ProgressState {
    /// Create an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event. A terminal status is never replaced.
    pub fn update(&mut self, status: JobStatus) {
        self.events += 1;
        if self.current.as_ref().is_some_and(JobStatus::is_terminal) {
            return;
        }
        self.current = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_latest_status() {
        let mut state = ProgressState::new();
        state.update(JobStatus::Starting);
        state.update(JobStatus::Downloading { percent: 10 });
        state.update(JobStatus::Downloading { percent: 55 });
        assert_eq!(state.current, Some(JobStatus::Downloading { percent: 55 }));
        assert_eq!(state.events, 3);
    }

    #[test]
    fn terminal_status_sticks() {
        let mut state = ProgressState::new();
        state.update(JobStatus::Completed {
            kind: MediaKind::Audio,
        });
        state.update(JobStatus::Uploading {
            kind: MediaKind::Audio,
            percent: 99,
        });
        assert_eq!(
            state.current,
            Some(JobStatus::Completed {
                kind: MediaKind::Audio
            })
        );
    }
}
