use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Both edge halves stored for one tracked document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Edges {
    /// Tracked documents this one imports.
    pub references_to: HashSet<PathBuf>,

    /// Tracked documents importing this one.
    pub referenced_by: HashSet<PathBuf>,
}

/// What an [`upsert_edges`](crate::ReferenceGraph::upsert_edges) call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeDelta {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    /// Requested targets dropped because they are not tracked.
    pub ignored: Vec<PathBuf>,
}

impl EdgeDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// One disagreement found by [`check_invariants`](crate::ReferenceGraph::check_invariants).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// Path indexed to a node that is gone or holds another path.
    StaleIndex { path: PathBuf },
    /// Node the path index does not point at.
    UnindexedNode { path: PathBuf },
    /// The same import recorded more than once.
    DuplicateEdge { from: PathBuf, to: PathBuf },
}

/// Sorted, serializable view of the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub documents: BTreeMap<PathBuf, DocumentEdges>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEdges {
    pub references_to: Vec<PathBuf>,
    pub referenced_by: Vec<PathBuf>,
}
