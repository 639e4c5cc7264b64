//! Job execution: scratch directories and the download/upload runner.

/// Download, transcode and upload of one choice
pub mod runner;
/// Job-owned scratch directories
pub mod scratch;

pub use runner::{build_caption, JobOutcome, JobRequest, JobRunner, MediaFile, MediaUploader};
pub use scratch::ScratchDir;
