use livedev_protocol::{AnalyzerFailure, ProtocolError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<notify::Error> for TrackerError {
    fn from(err: notify::Error) -> Self {
        Self::Watcher(err.to_string())
    }
}

/// Why analysing one document failed. Cached as the outcome of a pass, so it
/// must stay cheap to clone.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AnalysisError {
    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("analyzer timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("analyzer panicked: {message}")]
    Panicked { message: String },

    #[error("document not tracked: {}", .path.display())]
    Untracked { path: PathBuf },
}

impl From<AnalyzerFailure> for AnalysisError {
    fn from(failure: AnalyzerFailure) -> Self {
        match failure {
            AnalyzerFailure::ParseError { message } => Self::Parse { message },
            AnalyzerFailure::Timeout { after } => Self::Timeout { after },
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_string()
}
