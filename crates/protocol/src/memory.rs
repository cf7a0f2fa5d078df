//! In-memory collaborators.
//!
//! Hosts that keep documents in their own buffers can use these directly;
//! they also back the test suites of the downstream crates.

use crate::{
    Document, DocumentProvider, FileFilter, LanguageId, ProjectEvent, ProjectFiles,
    ProtocolError, Result,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{broadcast, watch};

const PROJECT_EVENT_CAPACITY: usize = 64;

pub struct MemoryDocument {
    path: PathBuf,
    language: LanguageId,
    text: RwLock<String>,
    refs: AtomicUsize,
    revision: watch::Sender<u64>,
}

impl MemoryDocument {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Arc<Self> {
        let path = path.into();
        let language = LanguageId::from_path(&path);
        Self::with_language(path, language, text)
    }

    pub fn with_language(
        path: impl Into<PathBuf>,
        language: LanguageId,
        text: impl Into<String>,
    ) -> Arc<Self> {
        let (revision, _) = watch::channel(0);
        Arc::new(Self {
            path: path.into(),
            language,
            text: RwLock::new(text.into()),
            refs: AtomicUsize::new(0),
            revision,
        })
    }

    /// Replaces the text and notifies change subscribers.
    pub fn set_text(&self, text: impl Into<String>) {
        *self.text.write().unwrap_or_else(PoisonError::into_inner) = text.into();
        self.revision.send_modify(|revision| *revision += 1);
    }

    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}

impl Document for MemoryDocument {
    fn path(&self) -> &Path {
        &self.path
    }

    fn language(&self) -> LanguageId {
        self.language.clone()
    }

    fn text(&self) -> String {
        self.text
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::SeqCst);
    }

    fn release_ref(&self) {
        let released = self
            .refs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if released.is_err() {
            log::warn!("release_ref on unreferenced document {}", self.path.display());
        }
    }

    fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

/// Document provider over an in-memory map, optionally opening unknown
/// paths from disk on first request.
#[derive(Default)]
pub struct MemoryDocuments {
    documents: RwLock<HashMap<PathBuf, Arc<MemoryDocument>>>,
    load_from_disk: bool,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_disk_fallback() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            load_from_disk: true,
        }
    }

    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) -> Arc<MemoryDocument> {
        let doc = MemoryDocument::new(path, text);
        self.insert_document(Arc::clone(&doc));
        doc
    }

    pub fn insert_document(&self, doc: Arc<MemoryDocument>) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(doc.path.clone(), doc);
    }

    pub fn get(&self, path: &Path) -> Option<Arc<MemoryDocument>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    pub fn remove(&self, path: &Path) -> Option<Arc<MemoryDocument>> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
    }

    /// Updates an open document; returns `false` when it is not open.
    pub fn set_text(&self, path: &Path, text: impl Into<String>) -> bool {
        match self.get(path) {
            Some(doc) => {
                doc.set_text(text);
                true
            }
            None => false,
        }
    }

    async fn open_from_disk(&self, path: &Path) -> Result<Arc<MemoryDocument>> {
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ProtocolError::DocumentNotFound(path.to_path_buf())
            } else {
                ProtocolError::from(err)
            }
        })?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ProtocolError::DocumentNotFound(path.to_path_buf()))?;

        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let doc = documents
            .entry(path.to_path_buf())
            .or_insert_with(|| MemoryDocument::new(path, text));
        Ok(Arc::clone(doc))
    }
}

#[async_trait]
impl DocumentProvider for MemoryDocuments {
    async fn document_for_path(&self, path: &Path) -> Result<Arc<dyn Document>> {
        if let Some(doc) = self.get(path) {
            return Ok(doc);
        }
        if !self.load_from_disk {
            return Err(ProtocolError::DocumentNotFound(path.to_path_buf()));
        }
        let doc = self.open_from_disk(path).await?;
        Ok(doc)
    }
}

/// Project lister over a file list the host sets explicitly.
pub struct MemoryProject {
    root: PathBuf,
    files: Mutex<Vec<PathBuf>>,
    events: broadcast::Sender<ProjectEvent>,
}

impl MemoryProject {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(PROJECT_EVENT_CAPACITY);
        Self {
            root: root.into(),
            files: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the file list and fires [`ProjectEvent::FilesChanged`].
    pub fn set_files<I, P>(&self, files: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let files: Vec<PathBuf> = files.into_iter().map(Into::into).collect();
        *self.files.lock().unwrap_or_else(PoisonError::into_inner) = files;
        let _ = self.events.send(ProjectEvent::FilesChanged);
    }

    pub fn add_file(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        {
            let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
            if files.contains(&path) {
                return;
            }
            files.push(path);
        }
        let _ = self.events.send(ProjectEvent::FilesChanged);
    }

    pub fn remove_file(&self, path: &Path) {
        let removed = {
            let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
            let before = files.len();
            files.retain(|candidate| candidate != path);
            files.len() != before
        };
        if removed {
            let _ = self.events.send(ProjectEvent::FilesChanged);
        }
    }
}

#[async_trait]
impl ProjectFiles for MemoryProject {
    async fn list_files(&self, filter: &FileFilter) -> Result<Vec<PathBuf>> {
        Ok(self
            .files()
            .into_iter()
            .filter(|path| filter.allows_path(&self.root, path))
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProjectEvent> {
        self.events.subscribe()
    }
}
