use crate::analyzer::AnalyzerRegistry;
use crate::context::{AnalysisLane, AnalysisOutcome, DocumentContext, UpdateLane};
use crate::updater::fan_out;
use crate::{
    AnalysisError, ChangeReport, DocumentState, ReconcileReport, Result, TrackerConfig,
    TrackerEvent, TrackerHealth, UpdateDispatch, UpdateReport,
};
use futures::future::join_all;
use livedev_clients::{ClientRegistry, DocumentUpdate};
use livedev_graph::{GraphSnapshot, ReferenceGraph};
use livedev_protocol::{
    AnalysisResult, Analyzer, Document, DocumentHandle, DocumentProvider, LanguageId,
    ProjectEvent, ProjectFiles, StaticServer,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex as TokioMutex};
use tokio::task::JoinHandle;

/// Keeps the reference graph of a project current and pushes document
/// changes, plus everything depending on them, to every connected session.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    config: TrackerConfig,
    documents: Arc<dyn DocumentProvider>,
    project: Arc<dyn ProjectFiles>,
    server: Arc<dyn StaticServer>,
    clients: Arc<ClientRegistry>,
    analyzers: AnalyzerRegistry,
    state: Mutex<TrackerState>,
    reconcile_lock: TokioMutex<()>,
    events: broadcast::Sender<TrackerEvent>,
    health: watch::Sender<TrackerHealth>,
    project_listener: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct TrackerState {
    contexts: HashMap<PathBuf, DocumentContext>,
    graph: ReferenceGraph,
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        let listener = self
            .project_listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener.abort();
        }
    }
}

pub struct TrackerBuilder {
    config: TrackerConfig,
    documents: Arc<dyn DocumentProvider>,
    project: Arc<dyn ProjectFiles>,
    server: Arc<dyn StaticServer>,
    clients: Arc<ClientRegistry>,
    analyzers: AnalyzerRegistry,
}

impl TrackerBuilder {
    #[must_use]
    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn analyzer(mut self, language: impl Into<LanguageId>, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzers.register(language, analyzer);
        self
    }

    #[must_use]
    pub fn analyzers(mut self, analyzers: AnalyzerRegistry) -> Self {
        self.analyzers = analyzers;
        self
    }

    pub fn build(self) -> Result<Tracker> {
        self.config.validate()?;
        let (events, _) = broadcast::channel(self.config.event_capacity);
        let (health, _) = watch::channel(TrackerHealth::default());

        Ok(Tracker {
            inner: Arc::new(TrackerInner {
                config: self.config,
                documents: self.documents,
                project: self.project,
                server: self.server,
                clients: self.clients,
                analyzers: self.analyzers,
                state: Mutex::new(TrackerState::default()),
                reconcile_lock: TokioMutex::new(()),
                events,
                health,
                project_listener: Mutex::new(None),
            }),
        })
    }
}

impl Tracker {
    pub fn builder(
        documents: Arc<dyn DocumentProvider>,
        project: Arc<dyn ProjectFiles>,
        server: Arc<dyn StaticServer>,
        clients: Arc<ClientRegistry>,
    ) -> TrackerBuilder {
        TrackerBuilder {
            config: TrackerConfig::default(),
            documents,
            project,
            server,
            clients,
            analyzers: AnalyzerRegistry::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.inner.clients
    }

    /// Tracks the current project files and follows project changes from now on.
    pub async fn start(&self) -> Result<ReconcileReport> {
        let mut project_events = self.inner.project.subscribe();
        let report = self.reconcile().await?;

        let weak = Arc::downgrade(&self.inner);
        let listener = tokio::spawn(async move {
            loop {
                match project_events.recv().await {
                    Ok(ProjectEvent::FilesChanged) | Err(RecvError::Lagged(_)) => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        if let Err(err) = (Tracker { inner }).reconcile().await {
                            log::warn!("project reconcile failed: {err}");
                        }
                    }
                    Ok(ProjectEvent::FileModified(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let previous = self
            .inner
            .project_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(listener);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(report)
    }

    /// Stops following the project and untracks every document.
    pub fn shutdown(&self) {
        let listener = self
            .inner
            .project_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener.abort();
        }

        let paths = self.tracked_paths();
        for path in &paths {
            self.inner.forget(path);
        }
        self.inner.server.register_filter_for_files(&[]);
        log::info!("tracker stopped, released {} documents", paths.len());
    }

    /// Brings the tracked set in line with the project's file list.
    ///
    /// Removed files are forgotten; added files are opened, subscribed to
    /// and (when configured) analysed once. Files that cannot be opened are
    /// skipped. Concurrent calls run one at a time.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let _serial = self.inner.reconcile_lock.lock().await;

        let listed: BTreeSet<PathBuf> = self
            .inner
            .project
            .list_files(&self.inner.config.file_filter)
            .await?
            .into_iter()
            .collect();

        let (added, removed) = {
            let state = self.inner.lock_state();
            let added: Vec<PathBuf> = listed
                .iter()
                .filter(|path| !state.contexts.contains_key(*path))
                .cloned()
                .collect();
            let mut removed: Vec<PathBuf> = state
                .contexts
                .keys()
                .filter(|path| !listed.contains(*path))
                .cloned()
                .collect();
            removed.sort();
            (added, removed)
        };

        for path in &removed {
            self.inner.forget(path);
        }

        let opened = join_all(added.iter().map(|path| async move {
            (path, self.inner.documents.document_for_path(path).await)
        }))
        .await;

        let mut report = ReconcileReport {
            removed,
            ..ReconcileReport::default()
        };
        for (path, opened) in opened {
            match opened {
                Ok(document) => {
                    self.remember(path.clone(), document);
                    report.added.push(path.clone());
                }
                Err(err) => {
                    log::debug!("not tracking {}: {err}", path.display());
                    report.skipped.push(path.clone());
                }
            }
        }

        let tracked = self.tracked_paths();
        self.inner.server.register_filter_for_files(&tracked);

        if self.inner.config.initial_analysis && !report.added.is_empty() {
            let targets = self.inner.analysis_targets_for_added(&report.added);
            join_all(targets.iter().map(|path| self.analyze(path))).await;
        }

        self.inner.emit(TrackerEvent::Reconciled {
            added: report.added.len(),
            removed: report.removed.len(),
        });
        log::info!(
            "tracking {} documents (+{} -{}, {} skipped)",
            tracked.len(),
            report.added.len(),
            report.removed.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn remember(&self, path: PathBuf, document: Arc<dyn Document>) {
        let handle = DocumentHandle::acquire(document);
        let changes = handle.subscribe_changes();
        let mut context = DocumentContext::new(path.clone(), handle);
        context.set_listener(spawn_change_listener(
            Arc::downgrade(&self.inner),
            path.clone(),
            changes,
        ));

        let replaced = {
            let mut state = self.inner.lock_state();
            state.graph.track(path.clone());
            let replaced = state.contexts.insert(path.clone(), context);
            self.inner.set_tracked(state.contexts.len());
            replaced
        };
        drop(replaced);

        log::debug!("tracking {}", path.display());
        self.inner.emit(TrackerEvent::DocumentTracked { path });
    }

    /// Analyses `path` with every analyzer registered for its language.
    ///
    /// Passes over one document never overlap. A request arriving while a
    /// pass runs waits for it and is then served by a pass that starts after
    /// the request, so a result never predates the request. On success the
    /// result becomes the document's current analysis and its imports
    /// replace the document's outgoing edges; on failure both stay as they were.
    pub async fn analyze(&self, path: &Path) -> std::result::Result<Arc<AnalysisResult>, AnalysisError> {
        let (lane, document) = {
            let state = self.inner.lock_state();
            let context = state.contexts.get(path).ok_or_else(|| AnalysisError::Untracked {
                path: path.to_path_buf(),
            })?;
            (
                Arc::clone(context.analysis_lane()),
                Arc::clone(context.document().document()),
            )
        };

        let ticket = lane.take_ticket();
        let mut progress = lane.lock().await;
        if progress.completed_for >= ticket {
            if let Some(outcome) = progress.last_outcome.clone() {
                return outcome;
            }
        }

        let generation = lane.latest_ticket();
        let pass = lane.mark_running();
        let outcome = self.inner.run_analysis(path, &lane, document.as_ref(), generation).await;
        progress.completed_for = generation;
        progress.last_outcome = Some(outcome.clone());
        drop(pass);
        drop(progress);

        self.inner.record_analysis(path, generation, &outcome);
        outcome
    }

    /// Pushes `path` to every session, best effort.
    ///
    /// At most one update per document runs at a time. A request made while
    /// one runs returns [`UpdateDispatch::Deferred`] and makes the running
    /// update start over with the then-current content once it finishes;
    /// any number of such requests cause a single restart.
    pub async fn update_document(&self, path: &Path) -> UpdateDispatch {
        if self.inner.clients.get_sessions().is_empty() {
            return UpdateDispatch::NoSessions;
        }

        let lane = {
            let state = self.inner.lock_state();
            match state.contexts.get(path) {
                Some(context) => Arc::clone(context.update_lane()),
                None => return UpdateDispatch::Untracked,
            }
        };

        if !lane.try_begin() {
            log::debug!("{}: update superseded, restarting when done", path.display());
            return UpdateDispatch::Deferred;
        }

        let inner = Arc::clone(&self.inner);
        let owned_path = path.to_path_buf();
        let owned_lane = Arc::clone(&lane);
        let task = tokio::spawn(async move { inner.run_updates(owned_path, owned_lane).await });

        match task.await {
            Ok(report) => UpdateDispatch::Completed(report),
            Err(err) => {
                lane.release();
                log::error!("update task for {} died: {err}", path.display());
                self.inner.note_error(format!("update task died: {err}"));
                UpdateDispatch::Aborted(err.to_string())
            }
        }
    }

    /// Handles a content change of `path`: re-analyses the affected closure
    /// as it was before the change, then (when sessions exist) updates the
    /// closure as it is after analysis.
    ///
    /// Returns `None` for untracked paths.
    pub async fn document_changed(&self, path: &Path) -> Option<ChangeReport> {
        let analyzed = {
            let state = self.inner.lock_state();
            if !state.contexts.contains_key(path) {
                return None;
            }
            state.graph.affected_closure(path)
        };

        let outcomes = join_all(analyzed.iter().map(|target| self.analyze(target))).await;
        let analysis_failures: Vec<(PathBuf, AnalysisError)> = analyzed
            .iter()
            .zip(outcomes)
            .filter_map(|(target, outcome)| outcome.err().map(|err| (target.clone(), err)))
            .collect();

        let mut report = ChangeReport {
            analyzed,
            analysis_failures,
            ..ChangeReport::default()
        };

        if self.inner.clients.get_sessions().is_empty() {
            log::debug!("{} changed, no sessions to update", path.display());
            return Some(report);
        }

        report.updated = {
            let state = self.inner.lock_state();
            state
                .graph
                .affected_closure(path)
                .into_iter()
                .filter(|target| state.contexts.contains_key(target))
                .collect()
        };
        let dispatches = join_all(report.updated.iter().map(|target| self.update_document(target))).await;
        report.dispatches = report.updated.iter().cloned().zip(dispatches).collect();
        Some(report)
    }

    pub fn document_state(&self, path: &Path) -> Option<DocumentState> {
        let state = self.inner.lock_state();
        let context = state.contexts.get(path)?;
        if context.update_lane().is_in_progress() {
            Some(DocumentState::Updating)
        } else if context.analysis_lane().is_running() {
            Some(DocumentState::Analyzing)
        } else {
            Some(DocumentState::Idle)
        }
    }

    /// Last successful analysis of `path`.
    pub fn analysis_result(&self, path: &Path) -> Option<Arc<AnalysisResult>> {
        self.inner
            .lock_state()
            .contexts
            .get(path)
            .and_then(|context| context.pending_analysis_result().cloned())
    }

    /// Generation of the last committed analysis; 0 before the first success.
    pub fn analysis_generation(&self, path: &Path) -> Option<u64> {
        self.inner
            .lock_state()
            .contexts
            .get(path)
            .map(DocumentContext::generation)
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.inner.lock_state().contexts.contains_key(path)
    }

    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.inner.lock_state().graph.paths()
    }

    pub fn references_to(&self, path: &Path) -> Vec<PathBuf> {
        self.inner
            .lock_state()
            .graph
            .references_to(path)
            .unwrap_or_default()
    }

    pub fn referenced_by(&self, path: &Path) -> Vec<PathBuf> {
        self.inner
            .lock_state()
            .graph
            .referenced_by(path)
            .unwrap_or_default()
    }

    pub fn affected_closure(&self, path: &Path) -> Vec<PathBuf> {
        self.inner.lock_state().graph.affected_closure(path)
    }

    pub fn graph_snapshot(&self) -> GraphSnapshot {
        self.inner.lock_state().graph.snapshot()
    }

    /// Graph index disagreements; always empty unless something is broken.
    pub fn graph_violations(&self) -> Vec<livedev_graph::InvariantViolation> {
        self.inner.lock_state().graph.check_invariants()
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<TrackerEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn health_snapshot(&self) -> TrackerHealth {
        self.inner.health.borrow().clone()
    }

    #[must_use]
    pub fn health_stream(&self) -> watch::Receiver<TrackerHealth> {
        self.inner.health.subscribe()
    }
}

impl TrackerInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TrackerEvent) {
        let _ = self.events.send(event);
    }

    fn set_tracked(&self, count: usize) {
        self.health.send_modify(|health| health.tracked_documents = count);
    }

    fn note_error(&self, error: String) {
        self.health.send_modify(|health| health.last_error = Some(error));
    }

    fn forget(&self, path: &Path) {
        let removed = {
            let mut state = self.lock_state();
            state.graph.untrack(path);
            let removed = state.contexts.remove(path);
            self.set_tracked(state.contexts.len());
            removed
        };

        if let Some(context) = removed {
            log::debug!("untracking {}", context.path().display());
            drop(context);
            self.emit(TrackerEvent::DocumentUntracked {
                path: path.to_path_buf(),
            });
        }
    }

    /// Newly added documents plus tracked documents whose last analysis
    /// imported one of them: their edges to the new files were dropped while
    /// those were untracked.
    fn analysis_targets_for_added(&self, added: &[PathBuf]) -> Vec<PathBuf> {
        let added_set: HashSet<&PathBuf> = added.iter().collect();
        let state = self.lock_state();
        let mut targets: Vec<PathBuf> = added.to_vec();
        for (path, context) in &state.contexts {
            if added_set.contains(path) {
                continue;
            }
            let Some(result) = context.pending_analysis_result() else {
                continue;
            };
            let imports_added = result
                .imported_urls()
                .iter()
                .filter_map(|url| self.server.path_for_url(url))
                .any(|target| added_set.contains(&target));
            if imports_added {
                targets.push(path.clone());
            }
        }
        targets
    }

    async fn run_analysis(
        &self,
        path: &Path,
        lane: &Arc<AnalysisLane>,
        document: &dyn Document,
        generation: u64,
    ) -> AnalysisOutcome {
        let url = self.server.url_for_path(path);
        let text = document.text();
        let merged = self
            .analyzers
            .run(
                &document.language(),
                &text,
                &url,
                self.config.analyzer_timeout(),
            )
            .await;

        match merged {
            Ok(result) => self.commit_analysis(path, lane, generation, result),
            Err(err) => {
                log::warn!("analysis of {} failed: {err}", path.display());
                Err(err)
            }
        }
    }

    /// Stores a successful result and patches the graph, unless the
    /// document was untracked (or re-tracked) while the pass ran.
    fn commit_analysis(
        &self,
        path: &Path,
        lane: &Arc<AnalysisLane>,
        generation: u64,
        result: AnalysisResult,
    ) -> AnalysisOutcome {
        let result = Arc::new(result);
        let imports: Vec<PathBuf> = result
            .imported_urls()
            .iter()
            .filter_map(|url| self.server.path_for_url(url))
            .collect();

        let untracked = || AnalysisError::Untracked {
            path: path.to_path_buf(),
        };

        let mut guard = self.lock_state();
        let state = &mut *guard;
        let context = state
            .contexts
            .get_mut(path)
            .filter(|context| Arc::ptr_eq(context.analysis_lane(), lane))
            .ok_or_else(untracked)?;

        if !context.commit_analysis(generation, Arc::clone(&result)) {
            return Ok(result);
        }
        let delta = state
            .graph
            .upsert_edges(path, imports)
            .map_err(|_| untracked())?;
        if !delta.is_empty() {
            log::debug!(
                "{}: +{} -{} references",
                path.display(),
                delta.added.len(),
                delta.removed.len()
            );
        }
        Ok(result)
    }

    fn record_analysis(&self, path: &Path, generation: u64, outcome: &AnalysisOutcome) {
        let result = outcome.as_ref().map(|_| ()).map_err(Clone::clone);
        self.health.send_modify(|health| {
            health.analyses_run += 1;
            if let Err(err) = &result {
                health.analyses_failed += 1;
                health.last_error = Some(format!("{}: {err}", path.display()));
            }
        });
        self.emit(TrackerEvent::AnalysisSettled {
            path: path.to_path_buf(),
            generation,
            result,
        });
    }

    fn prepare_update(&self, path: &Path, lane: &Arc<UpdateLane>) -> Option<DocumentUpdate> {
        let state = self.lock_state();
        let context = state
            .contexts
            .get(path)
            .filter(|context| Arc::ptr_eq(context.update_lane(), lane))?;
        let document = Arc::clone(context.document().document());
        Some(DocumentUpdate {
            url: self.server.url_for_path(path),
            language: document.language(),
            analysis: context.pending_analysis_result().cloned(),
            document,
        })
    }

    async fn run_updates(&self, path: PathBuf, lane: Arc<UpdateLane>) -> UpdateReport {
        let mut report = UpdateReport::new(path);

        loop {
            let Some(update) = self.prepare_update(&report.path, &lane) else {
                log::debug!("{} untracked during update", report.path.display());
                lane.release();
                break;
            };
            let sessions = self.clients.get_sessions();
            let failures = fan_out(&update, &sessions, self.config.updater_timeout()).await;

            report.runs += 1;
            report.sessions = sessions.len();
            report.failures = failures;
            let failure_count = report.failures.len() as u64;
            self.health.send_modify(|health| {
                health.updates_run += 1;
                health.updater_failures += failure_count;
            });

            if lane.finish_or_restart() {
                report.superseded += 1;
                self.health.send_modify(|health| health.updates_restarted += 1);
                log::debug!("{} changed during update, restarting", report.path.display());
                continue;
            }
            break;
        }

        self.emit(TrackerEvent::UpdateSettled {
            path: report.path.clone(),
            runs: report.runs,
            failures: report.failures.len(),
        });
        report
    }
}

fn spawn_change_listener(
    inner: Weak<TrackerInner>,
    path: PathBuf,
    mut changes: watch::Receiver<u64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let tracker = Tracker { inner };
            let path = path.clone();
            tokio::spawn(async move {
                tracker.document_changed(&path).await;
            });
        }
    })
}
