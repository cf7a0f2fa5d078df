//! # Livedev Graph
//!
//! Tracks which documents import which others so that a change can be
//! propagated to everything depending on it.
//!
//! ## Model
//!
//! ```text
//! main.less ──references_to──> shared.less
//!     ^                            │
//!     └────────referenced_by───────┘
//! ```
//!
//! Documents are nodes of a `petgraph` stable digraph and each import is one
//! directed edge, read forwards for `references_to` and backwards for
//! `referenced_by`. Edges only connect tracked documents: imports of anything
//! else are dropped on insert. The affected closure of a document is the
//! breadth-first walk over the reversed graph starting at the document itself.

mod error;
mod graph;
mod types;

pub use error::{GraphError, Result};
pub use graph::ReferenceGraph;
pub use types::{DocumentEdges, EdgeDelta, Edges, GraphSnapshot, InvariantViolation};
