use crate::{LanguageId, Result};
use async_trait::async_trait;
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

/// An open editor document.
///
/// Documents are reference counted by the host: whoever keeps one alive across
/// edits must hold a reference (see [`DocumentHandle`]).
pub trait Document: Send + Sync {
    fn path(&self) -> &Path;

    fn language(&self) -> LanguageId;

    /// Current text, including unsaved edits.
    fn text(&self) -> String;

    fn add_ref(&self);

    fn release_ref(&self);

    /// Revision counter that changes on every content edit.
    fn subscribe_changes(&self) -> watch::Receiver<u64>;
}

/// Resolves project paths to open documents.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    /// Fails with [`crate::ProtocolError::DocumentNotFound`] for paths that
    /// cannot be opened as text (images, deleted files).
    async fn document_for_path(&self, path: &Path) -> Result<Arc<dyn Document>>;
}

/// Holds one reference on a document for as long as the handle lives.
pub struct DocumentHandle {
    document: Arc<dyn Document>,
}

impl DocumentHandle {
    pub fn acquire(document: Arc<dyn Document>) -> Self {
        document.add_ref();
        Self { document }
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.document
    }
}

impl Deref for DocumentHandle {
    type Target = dyn Document;

    fn deref(&self) -> &Self::Target {
        self.document.as_ref()
    }
}

impl Drop for DocumentHandle {
    fn drop(&mut self) {
        self.document.release_ref();
    }
}

impl fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("path", &self.document.path())
            .field("language", &self.document.language())
            .finish()
    }
}
