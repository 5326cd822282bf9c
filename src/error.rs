use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub use crate::transport::TransportError;

/// Where a scan was when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Submitting,
    Polling,
    Enriching,
    Assembled,
    Failed,
    TimedOut,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submitting => "submitting",
            Self::Polling => "polling",
            Self::Enriching => "enriching",
            Self::Assembled => "assembled",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("analysis service rejected the upload with status {status}")]
    UploadFailed { status: u16, body: String },

    #[error("analysis did not finish after {attempts} poll attempts")]
    AnalysisTimeout { attempts: u32 },

    #[error("transport error: {0}")]
    Transport(String),
}

impl ScanError {
    pub fn phase(&self) -> ScanPhase {
        match self {
            Self::AnalysisTimeout { .. } => ScanPhase::TimedOut,
            Self::UploadFailed { .. } | Self::Transport(_) => ScanPhase::Failed,
        }
    }
}

impl From<TransportError> for ScanError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("VIRUSTOTAL_API_KEY is not configured")]
    MissingApiKey,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history journal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("history record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("Expected multipart/form-data")]
    NotMultipart,

    #[error("Missing multipart boundary")]
    MissingBoundary,

    #[error("Malformed multipart body")]
    Malformed,
}
