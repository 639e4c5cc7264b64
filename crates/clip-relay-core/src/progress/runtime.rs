use super::state::{JobStatus, ProgressState};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

/// Transport capability that renders job status in the chat.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusSink: Send + Sync + 'static {
    /// Show `status` to the user, typically by editing one status message.
    async fn update_status(&self, status: &JobStatus) -> Result<()>;
}

/// Runtime configuration for progress updates.
#[derive(Debug, Clone, Copy)]
pub struct ProgressRuntimeConfig {
    /// Minimum duration between sink updates.
    pub throttle: Duration,
    /// Capacity of the reporter channel.
    pub channel_capacity: usize,
}

impl Default for ProgressRuntimeConfig {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(1500),
            channel_capacity: 64,
        }
    }
}

impl ProgressRuntimeConfig {
    /// Override the throttle interval.
    #[must_use]
    pub const fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Channel pair sized by this config.
    #[must_use]
    pub fn channel(&self) -> (mpsc::Sender<JobStatus>, Receiver<JobStatus>) {
        mpsc::channel(self.channel_capacity.max(1))
    }
}

/// Spawn the progress runtime loop on the Tokio runtime.
pub fn spawn_progress_runtime(
    sink: Arc<dyn StatusSink>,
    rx: Receiver<JobStatus>,
    config: ProgressRuntimeConfig,
) -> JoinHandle<ProgressState> {
    tokio::spawn(run_progress_loop(sink, rx, config))
}

async fn flush(sink: &dyn StatusSink, state: &ProgressState) {
    if let Some(status) = &state.current {
        if let Err(e) = sink.update_status(status).await {
            warn!(error = %e, "Progress update failed");
        }
    }
}

/// Run the progress update loop until every sender is dropped.
///
/// The first event is forwarded immediately; later ones at most once per
/// `throttle`. A pending state is flushed when the throttle window ends even
/// if no new event arrives, and once more when the channel closes.
pub async fn run_progress_loop(
    sink: Arc<dyn StatusSink>,
    mut rx: Receiver<JobStatus>,
    config: ProgressRuntimeConfig,
) -> ProgressState {
    let mut state = ProgressState::new();
    let mut last_update: Option<Instant> = None;
    let mut needs_update = false;

    loop {
        let event = match (needs_update, last_update) {
            (true, Some(last)) => {
                tokio::select! {
                    event = rx.recv() => event,
                    () = tokio::time::sleep_until(last + config.throttle) => {
                        flush(sink.as_ref(), &state).await;
                        last_update = Some(Instant::now());
                        needs_update = false;
                        continue;
                    }
                }
            }
            _ => rx.recv().await,
        };

        let Some(event) = event else {
            break;
        };

        state.update(event);
        needs_update = true;

        let due = last_update.is_none_or(|last| last.elapsed() >= config.throttle);
        if due {
            flush(sink.as_ref(), &state).await;
            last_update = Some(Instant::now());
            needs_update = false;
        }
    }

    if needs_update {
        flush(sink.as_ref(), &state).await;
    }

    state
}
