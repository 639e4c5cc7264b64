//! Job progress: status values, the reporter handed to backends and
//! uploaders, and the throttled runtime that forwards status to a sink.

/// Coalescing reporter used by backends and uploaders
pub mod reporter;
/// Throttled delivery loop and the sink trait
pub mod runtime;
/// Job status values and folded state
pub mod state;

pub use reporter::ProgressReporter;
pub use runtime::{spawn_progress_runtime, ProgressRuntimeConfig, StatusSink};
pub use state::{JobStatus, ProgressState};
