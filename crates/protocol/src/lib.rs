//! # Livedev Protocol
//!
//! Contracts between the live development tracker and its host: open
//! documents, the project file list, the static file server and the
//! remote page transport, plus the analyzer plug-in seam.
//!
//! ```text
//! Host editor ──> DocumentProvider / ProjectFiles
//!                        │
//!                        v
//!                  Tracker ──> Analyzer (per language)
//!                        │
//!                        v
//!          StaticServer + RemoteTransport ──> live page
//! ```
//!
//! The `memory` module carries in-process implementations used by simple
//! hosts and by tests.

mod analysis;
mod document;
mod error;
mod language;
mod memory;
pub mod path_filters;
mod project;
mod server;
mod transport;

pub use analysis::{AnalysisResult, Analyzer, AnalyzerFailure, CSS, IMPORTED_URLS};
pub use document::{Document, DocumentHandle, DocumentProvider};
pub use error::{ProtocolError, Result};
pub use language::LanguageId;
pub use memory::{MemoryDocument, MemoryDocuments, MemoryProject};
pub use path_filters::FileFilter;
pub use project::{ProjectEvent, ProjectFiles};
pub use server::{ProjectUrls, StaticServer};
pub use transport::{NodeId, RemoteTransport};
