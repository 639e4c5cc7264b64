//! Job failure taxonomy.
//!
//! Every variant is non-fatal to the service: it is rendered to the requesting
//! chat and the bot keeps serving other sessions.

use thiserror::Error;

/// Phase of a job that can run out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Metadata probe before options are shown
    Probe,
    /// Backend download and transcode
    Download,
    /// Upload to the destination chat
    Upload,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Probe => "probe",
            Self::Download => "download",
            Self::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// Errors surfaced while resolving or running a job
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// The message is not a recognizable HTTP(S) URL
    #[error("Not a valid link: {0}")]
    InvalidInput(String),
    /// The backend cannot introspect the source
    #[error("Source cannot be resolved: {0}")]
    UnresolvableSource(String),
    /// No stream satisfies the requested quality ceiling
    #[error("{label} is not available for this media")]
    QualityUnavailable {
        /// Label of the requested selector, e.g. `720p`
        label: String,
    },
    /// Extraction or transcode process failed
    #[error("Backend error: {0}")]
    BackendFailure(String),
    /// A phase exceeded its configured timeout
    #[error("Timed out during {phase}")]
    BackendTimeout {
        /// The phase that timed out
        phase: JobPhase,
    },
    /// Uploading the result to the destination failed
    #[error("Upload failed: {0}")]
    TransportFailure(String),
    /// The button press references a consumed or unknown session
    #[error("Session expired")]
    ExpiredSession,
}

impl From<std::io::Error> for JobError {
    fn from(e: std::io::Error) -> Self {
        Self::BackendFailure(e.to_string())
    }
}
