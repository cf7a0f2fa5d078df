#![allow(dead_code)]

use async_trait::async_trait;
use livedev_clients::{ClientDescriptor, ClientRegistry, DocumentUpdate, Session, UpdateError, Updater};
use livedev_protocol::{
    AnalysisResult, Analyzer, AnalyzerFailure, Document, DocumentProvider, LanguageId,
    MemoryProject, NodeId, ProjectUrls, ProtocolError, RemoteTransport,
};
use livedev_tracker::{Tracker, TrackerConfig, TrackerEvent};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Semaphore};

pub const ROOT: &str = "/site";
pub const BASE_URL: &str = "http://localhost:8080/";

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn site(name: &str) -> PathBuf {
    Path::new(ROOT).join(name)
}

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn file_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

pub struct NullTransport;

#[async_trait]
impl RemoteTransport for NullTransport {
    async fn find_nodes_matching(&self, _selector: &str) -> livedev_protocol::Result<Vec<NodeId>> {
        Ok(Vec::new())
    }

    async fn node_properties(
        &self,
        _node: NodeId,
    ) -> livedev_protocol::Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    async fn replace_node_content(&self, _node: NodeId, _html: &str) -> livedev_protocol::Result<()> {
        Ok(())
    }

    fn was_url_requested(&self, _url: &str) -> bool {
        true
    }
}

/// Document whose edits stay silent until [`QuietDocument::notify`].
pub struct QuietDocument {
    path: PathBuf,
    text: Mutex<String>,
    refs: AtomicUsize,
    changes: watch::Sender<u64>,
}

impl QuietDocument {
    pub fn edit(&self, text: &str) {
        *self.text.lock().unwrap() = text.to_string();
    }

    pub fn notify(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }
}

impl Document for QuietDocument {
    fn path(&self) -> &Path {
        &self.path
    }

    fn language(&self) -> LanguageId {
        LanguageId::from_path(&self.path)
    }

    fn text(&self) -> String {
        self.text.lock().unwrap().clone()
    }

    fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::SeqCst);
    }

    fn release_ref(&self) {
        self.refs.fetch_sub(1, Ordering::SeqCst);
    }

    fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

#[derive(Default)]
pub struct QuietDocuments {
    docs: Mutex<HashMap<PathBuf, Arc<QuietDocument>>>,
}

impl QuietDocuments {
    pub fn insert(&self, path: PathBuf, text: &str) -> Arc<QuietDocument> {
        let (changes, _) = watch::channel(0);
        let doc = Arc::new(QuietDocument {
            path: path.clone(),
            text: Mutex::new(text.to_string()),
            refs: AtomicUsize::new(0),
            changes,
        });
        self.docs.lock().unwrap().insert(path, Arc::clone(&doc));
        doc
    }
}

#[async_trait]
impl DocumentProvider for QuietDocuments {
    async fn document_for_path(&self, path: &Path) -> livedev_protocol::Result<Arc<dyn Document>> {
        let doc = self.docs.lock().unwrap().get(path).cloned();
        match doc {
            Some(doc) => Ok(doc),
            None => Err(ProtocolError::DocumentNotFound(path.to_path_buf())),
        }
    }
}

/// Treats every `import <file>` line as an import relative to the document.
/// Sources containing `!fail` fail to parse.
#[derive(Default)]
pub struct LineImports {
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    delay: Duration,
    log: Option<Log>,
}

impl LineImports {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn logging(log: &Log) -> Arc<Self> {
        Arc::new(Self {
            log: Some(Arc::clone(log)),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for LineImports {
    async fn analyze(&self, source: &str, base_url: &str) -> Result<AnalysisResult, AnalyzerFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("analyze {}", file_name(base_url)));
        }
        if source.contains("!fail") {
            return Err(AnalyzerFailure::parse("unexpected token"));
        }

        let dir = base_url.rsplit_once('/').map_or(base_url, |(dir, _)| dir);
        let urls: Vec<String> = source
            .lines()
            .filter_map(|line| line.trim().strip_prefix("import "))
            .map(|name| format!("{dir}/{}", name.trim()))
            .collect();
        Ok(AnalysisResult::new().with_imported_urls(urls))
    }
}

pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    Hang,
}

/// Records the document text each time it runs. With a gate, every run
/// first announces itself on `started` and then waits for a permit.
pub struct RecordingUpdater {
    seen: Mutex<Vec<String>>,
    behavior: Behavior,
    log: Option<Log>,
    gate: Option<(Arc<Semaphore>, mpsc::UnboundedSender<String>)>,
}

impl RecordingUpdater {
    pub fn new() -> Arc<Self> {
        Self::with_behavior(Behavior::Succeed)
    }

    pub fn with_behavior(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            behavior,
            log: None,
            gate: None,
        })
    }

    pub fn logging(log: &Log) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            behavior: Behavior::Succeed,
            log: Some(Arc::clone(log)),
            gate: None,
        })
    }

    pub fn gated() -> (Arc<Self>, Arc<Semaphore>, mpsc::UnboundedReceiver<String>) {
        Self::gated_with(Behavior::Succeed)
    }

    pub fn gated_with(
        behavior: Behavior,
    ) -> (Arc<Self>, Arc<Semaphore>, mpsc::UnboundedReceiver<String>) {
        let gate = Arc::new(Semaphore::new(0));
        let (started, started_rx) = mpsc::unbounded_channel();
        let updater = Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            behavior,
            log: None,
            gate: Some((Arc::clone(&gate), started)),
        });
        (updater, gate, started_rx)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Updater for RecordingUpdater {
    async fn update(&self, update: &DocumentUpdate, _session: &Session) -> Result<(), UpdateError> {
        let text = update.document.text();
        if let Some((gate, started)) = &self.gate {
            let _ = started.send(text.clone());
            gate.acquire().await.unwrap().forget();
        }
        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("update {}", file_name(&update.url)));
        }
        self.seen.lock().unwrap().push(text);

        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(UpdateError::failed("stylesheet link not found")),
            Behavior::Panic => panic!("updater exploded"),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

/// Project, server and client registry of a site rooted at [`ROOT`].
pub struct Site {
    pub project: Arc<MemoryProject>,
    pub server: Arc<ProjectUrls>,
    pub clients: Arc<ClientRegistry>,
}

impl Site {
    pub fn new() -> Self {
        Self {
            project: Arc::new(MemoryProject::new(ROOT)),
            server: Arc::new(ProjectUrls::new(BASE_URL, ROOT)),
            clients: Arc::new(ClientRegistry::new()),
        }
    }

    pub fn tracker(
        &self,
        documents: Arc<dyn DocumentProvider>,
        analyzer: Arc<dyn Analyzer>,
        config: TrackerConfig,
    ) -> Tracker {
        Tracker::builder(
            documents,
            self.project.clone(),
            self.server.clone(),
            self.clients.clone(),
        )
        .config(config)
        .analyzer("less", analyzer)
        .build()
        .unwrap()
    }

    /// Registers client `id` with `updaters` for less and opens one session on it.
    pub async fn connect(&self, id: &str, updaters: Vec<Arc<dyn Updater>>) -> Arc<Session> {
        let client = match self.clients.client(id) {
            Some(client) => client,
            None => {
                let mut descriptor = ClientDescriptor::new(id, format!("Client {id}"));
                for updater in updaters {
                    descriptor.add_updater("less", updater);
                }
                self.clients.register_client(descriptor).unwrap()
            }
        };
        client.connect(Arc::new(NullTransport)).await.unwrap()
    }
}

pub fn quiet_config() -> TrackerConfig {
    TrackerConfig {
        initial_analysis: false,
        ..TrackerConfig::default()
    }
}

/// Waits until `matches` accepts an event, failing after five seconds.
pub async fn wait_for<F>(events: &mut broadcast::Receiver<TrackerEvent>, mut matches: F) -> TrackerEvent
where
    F: FnMut(&TrackerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for tracker event")
}

/// Polls `condition` every millisecond for up to five seconds.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
