use crate::AnalysisError;
use livedev_protocol::{AnalysisResult, DocumentHandle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;

pub(crate) type AnalysisOutcome = Result<Arc<AnalysisResult>, AnalysisError>;

/// Tracked state of one document.
///
/// Dropping the context releases the document reference and stops its
/// change listener.
pub(crate) struct DocumentContext {
    path: PathBuf,
    document: DocumentHandle,
    listener: Option<JoinHandle<()>>,
    analysis: Arc<AnalysisLane>,
    update: Arc<UpdateLane>,
    pending_analysis_result: Option<Arc<AnalysisResult>>,
    generation: u64,
}

impl DocumentContext {
    pub(crate) fn new(path: PathBuf, document: DocumentHandle) -> Self {
        Self {
            path,
            document,
            listener: None,
            analysis: Arc::new(AnalysisLane::default()),
            update: Arc::new(UpdateLane::default()),
            pending_analysis_result: None,
            generation: 0,
        }
    }

    pub(crate) fn set_listener(&mut self, listener: JoinHandle<()>) {
        if let Some(previous) = self.listener.replace(listener) {
            previous.abort();
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn document(&self) -> &DocumentHandle {
        &self.document
    }

    pub(crate) fn analysis_lane(&self) -> &Arc<AnalysisLane> {
        &self.analysis
    }

    pub(crate) fn update_lane(&self) -> &Arc<UpdateLane> {
        &self.update
    }

    pub(crate) fn pending_analysis_result(&self) -> Option<&Arc<AnalysisResult>> {
        self.pending_analysis_result.as_ref()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Stores a result unless a newer generation was already committed.
    pub(crate) fn commit_analysis(&mut self, generation: u64, result: Arc<AnalysisResult>) -> bool {
        if generation < self.generation {
            return false;
        }
        self.generation = generation;
        self.pending_analysis_result = Some(result);
        true
    }
}

impl Drop for DocumentContext {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        log::debug!("released {}", self.path.display());
    }
}

/// Serializes analysis passes of one document.
///
/// Every request takes a ticket. The pass holding `progress` analyses the
/// text current when it starts and covers every ticket issued before that;
/// callers whose ticket is already covered reuse the outcome instead of
/// running again.
#[derive(Default)]
pub(crate) struct AnalysisLane {
    requested: AtomicU64,
    running: AtomicBool,
    progress: TokioMutex<LaneProgress>,
}

#[derive(Default)]
pub(crate) struct LaneProgress {
    pub(crate) completed_for: u64,
    pub(crate) last_outcome: Option<AnalysisOutcome>,
}

impl AnalysisLane {
    pub(crate) fn take_ticket(&self) -> u64 {
        self.requested.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn latest_ticket(&self) -> u64 {
        self.requested.load(Ordering::SeqCst)
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, LaneProgress> {
        self.progress.lock().await
    }

    /// Marks a pass as running until the returned guard drops, including
    /// when the analysing future is dropped mid-pass.
    pub(crate) fn mark_running(&self) -> RunningPass<'_> {
        self.running.store(true, Ordering::SeqCst);
        RunningPass { lane: self }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub(crate) struct RunningPass<'a> {
    lane: &'a AnalysisLane,
}

impl Drop for RunningPass<'_> {
    fn drop(&mut self) {
        self.lane.running.store(false, Ordering::SeqCst);
    }
}

/// Supersede-and-restart flags for the updates of one document.
#[derive(Default)]
pub(crate) struct UpdateLane {
    flags: Mutex<UpdateFlags>,
}

#[derive(Default)]
struct UpdateFlags {
    in_progress: bool,
    discard_current: bool,
}

impl UpdateLane {
    /// Claims the lane; when it is busy, marks the running pass as superseded instead.
    pub(crate) fn try_begin(&self) -> bool {
        let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        if flags.in_progress {
            flags.discard_current = true;
            return false;
        }
        flags.in_progress = true;
        true
    }

    /// Called when a pass completes. Returns `true` if another pass must
    /// run because the finished one was superseded; otherwise releases the lane.
    pub(crate) fn finish_or_restart(&self) -> bool {
        let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        if flags.discard_current {
            flags.discard_current = false;
            return true;
        }
        flags.in_progress = false;
        false
    }

    pub(crate) fn release(&self) {
        let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        flags.in_progress = false;
        flags.discard_current = false;
    }

    pub(crate) fn is_in_progress(&self) -> bool {
        self.flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_lane_restarts_once_per_burst() {
        let lane = UpdateLane::default();
        assert!(lane.try_begin());
        assert!(!lane.try_begin());
        assert!(!lane.try_begin());

        assert!(lane.finish_or_restart());
        assert!(lane.is_in_progress());
        assert!(!lane.finish_or_restart());
        assert!(!lane.is_in_progress());
        assert!(lane.try_begin());
    }

    #[test]
    fn analysis_tickets_are_monotonic() {
        let lane = AnalysisLane::default();
        assert_eq!(lane.take_ticket(), 1);
        assert_eq!(lane.take_ticket(), 2);
        assert_eq!(lane.latest_ticket(), 2);
    }
}
