use crate::scanner::{is_hidden, is_ignored_scope, FileScanner, ScanOptions};
use crate::{Result, TrackerError};
use async_trait::async_trait;
use ignore::WalkBuilder;
use livedev_protocol::{FileFilter, ProjectEvent, ProjectFiles};
use log::warn;
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const PROJECT_EVENT_CAPACITY: usize = 256;
const NOTIFY_POLL_INTERVAL: Duration = Duration::from_secs(2);

type SharedWatcher = Arc<Mutex<Option<RecommendedWatcher>>>;
type WatchState = Arc<Mutex<HashSet<PathBuf>>>;

/// Project lister backed by the filesystem.
///
/// Created with [`FsProject::watch`], it also follows the tree: creations,
/// removals and renames fire [`ProjectEvent::FilesChanged`], content writes
/// fire [`ProjectEvent::FileModified`].
pub struct FsProject {
    scanner: Arc<FileScanner>,
    events: broadcast::Sender<ProjectEvent>,
    watching: Option<Watching>,
}

struct Watching {
    _watcher: SharedWatcher,
    watch_state: WatchState,
    task: JoinHandle<()>,
}

impl FsProject {
    /// Lists files on demand without watching.
    pub fn new(options: ScanOptions) -> Self {
        let (events, _) = broadcast::channel(PROJECT_EVENT_CAPACITY);
        Self {
            scanner: Arc::new(FileScanner::new(options)),
            events,
            watching: None,
        }
    }

    /// Lists and watches. Must be called inside a tokio runtime.
    pub fn watch(options: ScanOptions) -> Result<Self> {
        let mut project = Self::new(options);
        let (event_tx, event_rx) = mpsc::channel(1024);
        let root = project.scanner.root().to_path_buf();

        let (watcher, watch_state) = create_fs_watcher(&root, event_tx)?;
        let watcher = Arc::new(Mutex::new(Some(watcher)));

        let task = spawn_event_loop(
            root,
            project.scanner.include_hidden(),
            event_rx,
            project.events.clone(),
            watcher.clone(),
            watch_state.clone(),
        );

        project.watching = Some(Watching {
            _watcher: watcher,
            watch_state,
            task,
        });
        Ok(project)
    }

    pub fn root(&self) -> &Path {
        self.scanner.root()
    }

    /// Directories currently watched; 0 when not watching.
    pub fn watch_count(&self) -> usize {
        self.watching.as_ref().map_or(0, |watching| {
            watching
                .watch_state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        })
    }
}

impl Drop for FsProject {
    fn drop(&mut self) {
        if let Some(watching) = self.watching.take() {
            watching.task.abort();
        }
    }
}

#[async_trait]
impl ProjectFiles for FsProject {
    async fn list_files(&self, filter: &FileFilter) -> livedev_protocol::Result<Vec<PathBuf>> {
        let scanner = Arc::clone(&self.scanner);
        let filter = filter.clone();
        tokio::task::spawn_blocking(move || scanner.scan(&filter))
            .await
            .map_err(|e| livedev_protocol::ProtocolError::Other(format!("scan task failed: {e}")))
    }

    fn subscribe(&self) -> broadcast::Receiver<ProjectEvent> {
        self.events.subscribe()
    }
}

fn create_fs_watcher(
    root: &Path,
    sender: mpsc::Sender<notify::Result<Event>>,
) -> Result<(RecommendedWatcher, WatchState)> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = sender.blocking_send(res);
        },
        NotifyConfig::default().with_poll_interval(NOTIFY_POLL_INTERVAL),
    )
    .map_err(|e| TrackerError::Watcher(format!("watcher init failed: {e}")))?;

    let watch_state = Arc::new(Mutex::new(HashSet::new()));
    {
        let mut guard = watch_state.lock().unwrap_or_else(PoisonError::into_inner);
        for dir in build_watch_list(root) {
            if let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
                warn!("failed to watch {}: {err}", dir.display());
                continue;
            }
            guard.insert(dir);
        }
    }
    Ok((watcher, watch_state))
}

fn build_watch_list(root: &Path) -> Vec<PathBuf> {
    let mut out: HashSet<PathBuf> = HashSet::new();
    out.insert(root.to_path_buf());
    out.extend(watchable_dirs_under(root, root));
    out.into_iter().collect()
}

fn watchable_dirs_under(root: &Path, start: &Path) -> Vec<PathBuf> {
    let root_owned = root.to_path_buf();
    let mut builder = WalkBuilder::new(start);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true);
    builder.filter_entry(move |entry| is_watchable_dir(&root_owned, entry.path()));

    builder
        .build()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_dir()))
        .map(|entry| entry.path().to_path_buf())
        .filter(|path| is_watchable_dir(root, path))
        .collect()
}

fn is_watchable_dir(root: &Path, path: &Path) -> bool {
    path == root || (path.starts_with(root) && !is_ignored_scope(path, root))
}

/// Starts watching directories created after startup.
fn maybe_add_watches(root: &Path, evt: &Event, watcher: &SharedWatcher, watch_state: &WatchState) {
    if !matches!(evt.kind, EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))) {
        return;
    }

    let mut new_dirs = Vec::new();
    {
        let mut guard = watch_state.lock().unwrap_or_else(PoisonError::into_inner);
        for path in &evt.paths {
            if !path.is_dir() || !is_watchable_dir(root, path) {
                continue;
            }
            for dir in watchable_dirs_under(root, path) {
                if guard.insert(dir.clone()) {
                    new_dirs.push(dir);
                }
            }
        }
    }
    if new_dirs.is_empty() {
        return;
    }

    let mut watcher_guard = watcher.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(watcher) = watcher_guard.as_mut() else {
        return;
    };
    for dir in new_dirs {
        if let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            warn!("failed to watch {}: {err}", dir.display());
            watch_state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&dir);
        }
    }
}

fn spawn_event_loop(
    root: PathBuf,
    include_hidden: bool,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
    events: broadcast::Sender<ProjectEvent>,
    watcher: SharedWatcher,
    watch_state: WatchState,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                Ok(evt) => {
                    maybe_add_watches(&root, &evt, &watcher, &watch_state);
                    for project_event in classify_event(&root, include_hidden, &evt) {
                        let _ = events.send(project_event);
                    }
                }
                Err(err) => warn!("Watcher error: {err}"),
            }
        }
    })
}

fn is_relevant_path(root: &Path, path: &Path, include_hidden: bool) -> bool {
    if !path.starts_with(root) || is_ignored_scope(path, root) {
        return false;
    }
    include_hidden || !is_hidden(path, root)
}

fn classify_event(root: &Path, include_hidden: bool, evt: &Event) -> Vec<ProjectEvent> {
    let relevant: Vec<&PathBuf> = evt
        .paths
        .iter()
        .filter(|path| is_relevant_path(root, path, include_hidden))
        .collect();
    if relevant.is_empty() {
        return Vec::new();
    }

    match evt.kind {
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            vec![ProjectEvent::FilesChanged]
        }
        EventKind::Modify(_) => relevant
            .into_iter()
            .filter(|path| path.is_file())
            .map(|path| ProjectEvent::FileModified(path.clone()))
            .collect(),
        _ => Vec::new(),
    }
}
