use crate::AnalysisError;
use livedev_clients::{SessionId, UpdateError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a tracked document is in its analyse/update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Idle,
    Analyzing,
    Updating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFailure {
    pub session: SessionId,
    pub client: String,
    /// Position of the updater in the client's list for the language.
    pub updater: usize,
    pub error: UpdateError,
}

/// Result of one best-effort update of a document across all sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub path: PathBuf,
    /// Fan-out passes executed, restarts included.
    pub runs: u32,
    /// Passes whose content was superseded while they ran.
    pub superseded: u32,
    /// Sessions reached by the final pass.
    pub sessions: usize,
    /// Failures of the final pass.
    pub failures: Vec<UpdateFailure>,
}

impl UpdateReport {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }
}

/// What happened to an `update_document` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDispatch {
    /// No session is connected; nothing to push to.
    NoSessions,
    Untracked,
    /// An update was already running; it restarts with fresh content when done.
    Deferred,
    Completed(UpdateReport),
    /// The update task died; the document lane was released.
    Aborted(String),
}

/// Outcome of processing one content change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeReport {
    /// Closure analysed, taken before analysis.
    pub analyzed: Vec<PathBuf>,
    pub analysis_failures: Vec<(PathBuf, AnalysisError)>,
    /// Closure recomputed after analysis; empty when no session was connected.
    pub updated: Vec<PathBuf>,
    pub dispatches: Vec<(PathBuf, UpdateDispatch)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    /// Listed files that could not be opened as documents.
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    DocumentTracked {
        path: PathBuf,
    },
    DocumentUntracked {
        path: PathBuf,
    },
    AnalysisSettled {
        path: PathBuf,
        generation: u64,
        result: Result<(), AnalysisError>,
    },
    UpdateSettled {
        path: PathBuf,
        runs: u32,
        failures: usize,
    },
    Reconciled {
        added: usize,
        removed: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerHealth {
    pub tracked_documents: usize,
    pub analyses_run: u64,
    pub analyses_failed: u64,
    pub updates_run: u64,
    pub updater_failures: u64,
    pub updates_restarted: u64,
    pub last_error: Option<String>,
}
