use crate::{FileFilter, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectEvent {
    /// Files were added to or removed from the project.
    FilesChanged,
    /// A file's content changed on disk.
    FileModified(PathBuf),
}

/// Lists the files of the open project and reports when that list changes.
#[async_trait]
pub trait ProjectFiles: Send + Sync {
    async fn list_files(&self, filter: &FileFilter) -> Result<Vec<PathBuf>>;

    fn subscribe(&self) -> broadcast::Receiver<ProjectEvent>;
}
