#![deny(missing_docs)]
//! Clip Relay core library.
//!
//! Transport-agnostic session and job lifecycle: selectors, sessions,
//! format resolution, the media backend, the job runner and progress reporting.

/// Configuration management.
pub mod config;
/// Failure taxonomy shared by resolvers, backends and jobs.
pub mod error;
/// Download/transcode/upload execution.
pub mod job;
/// Media sources, selectors, resolvers and backends.
pub mod media;
/// Progress state, reporter and runtime loop.
pub mod progress;
/// Pending-choice store.
pub mod session;
/// Utility functions.
pub mod utils;

pub use error::JobError;
pub use job::{JobOutcome, JobRequest, JobRunner, MediaUploader};
pub use media::{MediaKind, Selector, SourceUrl};
pub use progress::{JobStatus, ProgressReporter, StatusSink};
pub use session::{Choice, Session, SessionId, SessionStore};
