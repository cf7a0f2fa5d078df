//! # Livedev Tracker
//!
//! Keeps a live picture of which project documents import which, and pushes
//! every change (plus everything that depends on it) to the connected
//! sessions.
//!
//! ## Flow
//!
//! ```text
//! ProjectFiles ──> reconcile ──> tracked documents + ReferenceGraph
//!                                      │
//! Document edit ──> document_changed   │
//!     │                                v
//!     ├──> analyze affected closure (coalesced per document)
//!     │      └─> imported urls ──> graph edges
//!     │
//!     └──> update_document (one in flight per document, restart on change)
//!            └─> every session × every updater for the language
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use livedev_clients::ClientRegistry;
//! use livedev_protocol::{MemoryDocuments, ProjectUrls};
//! use livedev_tracker::{FsProject, ScanOptions, Tracker};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> livedev_tracker::Result<()> {
//!     let project = Arc::new(FsProject::watch(ScanOptions::new("/path/to/site"))?);
//!     let tracker = Tracker::builder(
//!         Arc::new(MemoryDocuments::with_disk_fallback()),
//!         project,
//!         Arc::new(ProjectUrls::new("http://127.0.0.1:8080/", "/path/to/site")),
//!         Arc::new(ClientRegistry::new()),
//!     )
//!     .build()?;
//!
//!     let report = tracker.start().await?;
//!     println!("tracking {} documents", report.added.len());
//!     Ok(())
//! }
//! ```

mod analyzer;
mod config;
mod context;
mod error;
mod events;
mod scanner;
mod tracker;
mod updater;
mod watcher;

pub use analyzer::AnalyzerRegistry;
pub use config::TrackerConfig;
pub use error::{AnalysisError, Result, TrackerError};
pub use events::{
    ChangeReport, DocumentState, ReconcileReport, TrackerEvent, TrackerHealth, UpdateDispatch,
    UpdateFailure, UpdateReport,
};
pub use livedev_clients::UpdateError;
pub use scanner::{FileScanner, ScanOptions};
pub use tracker::{Tracker, TrackerBuilder};
pub use watcher::FsProject;
