use crate::error::{GraphError, Result};
use crate::types::{DocumentEdges, EdgeDelta, Edges, GraphSnapshot, InvariantViolation};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Bfs, Reversed};
use petgraph::Direction::{self, Incoming, Outgoing};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Import edges between tracked documents.
///
/// An edge `a -> b` means `a` imports `b`. Both directions are answered from
/// the same edge, so `references_to` and `referenced_by` cannot disagree.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    graph: StableDiGraph<PathBuf, ()>,
    index: HashMap<PathBuf, NodeIndex>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `path` with no edges. Returns `false` if already tracked.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.index.contains_key(&path) {
            return false;
        }
        let node = self.graph.add_node(path.clone());
        self.index.insert(path, node);
        true
    }

    /// Stops tracking `path`, dropping every edge touching it.
    pub fn untrack(&mut self, path: &Path) -> Option<Edges> {
        let node = self.index.remove(path)?;
        let edges = Edges {
            references_to: self.neighbor_paths(node, Outgoing).into_iter().collect(),
            referenced_by: self.neighbor_paths(node, Incoming).into_iter().collect(),
        };
        self.graph.remove_node(node);
        Some(edges)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Tracked paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.index.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Replaces the outgoing edges of `path`.
    ///
    /// Only the difference against the previous set is applied, so the cost
    /// is proportional to this document's edges. Untracked targets are
    /// reported in [`EdgeDelta::ignored`] and get no edge.
    pub fn upsert_edges<I>(&mut self, path: &Path, references_to: I) -> Result<EdgeDelta>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let source = self.node(path)?;
        let previous: HashSet<NodeIndex> = self.graph.neighbors_directed(source, Outgoing).collect();

        let mut next = HashSet::new();
        let mut ignored = Vec::new();
        for target in references_to {
            match self.index.get(&target) {
                Some(&node) => {
                    next.insert(node);
                }
                None if !ignored.contains(&target) => ignored.push(target),
                None => {}
            }
        }

        let stale: Vec<NodeIndex> = previous.difference(&next).copied().collect();
        let fresh: Vec<NodeIndex> = next.difference(&previous).copied().collect();

        let mut removed = Vec::with_capacity(stale.len());
        for target in stale {
            while let Some(edge) = self.graph.find_edge(source, target) {
                self.graph.remove_edge(edge);
            }
            removed.push(self.graph[target].clone());
        }
        let mut added = Vec::with_capacity(fresh.len());
        for target in fresh {
            self.graph.add_edge(source, target, ());
            added.push(self.graph[target].clone());
        }
        removed.sort();
        added.sort();

        if !ignored.is_empty() {
            log::debug!(
                "{}: ignoring {} untracked reference(s)",
                path.display(),
                ignored.len()
            );
        }

        Ok(EdgeDelta {
            added,
            removed,
            ignored,
        })
    }

    /// Direct imports of `path`, sorted.
    pub fn references_to(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let node = self.node(path)?;
        Ok(self.neighbor_paths(node, Outgoing))
    }

    /// Direct importers of `path`, sorted.
    pub fn referenced_by(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let node = self.node(path)?;
        Ok(self.neighbor_paths(node, Incoming))
    }

    /// Every document that depends on `path`, directly or transitively.
    ///
    /// Breadth-first over importers; the origin always comes first and each
    /// document appears once, cycles included. An untracked origin has no
    /// dependents.
    pub fn affected_closure(&self, path: &Path) -> Vec<PathBuf> {
        let Some(&start) = self.index.get(path) else {
            return vec![path.to_path_buf()];
        };

        let importers = Reversed(&self.graph);
        let mut bfs = Bfs::new(importers, start);
        let mut order = Vec::new();
        while let Some(node) = bfs.next(importers) {
            order.push(self.graph[node].clone());
        }
        order
    }

    /// Lists index entries and edges that disagree with the graph. Empty for
    /// a consistent graph.
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        for (path, &node) in &self.index {
            if self.graph.node_weight(node) != Some(path) {
                violations.push(InvariantViolation::StaleIndex { path: path.clone() });
            }
        }

        for node in self.graph.node_indices() {
            let path = &self.graph[node];
            if self.index.get(path) != Some(&node) {
                violations.push(InvariantViolation::UnindexedNode { path: path.clone() });
            }

            let mut seen = HashSet::new();
            for target in self.graph.neighbors_directed(node, Outgoing) {
                if !seen.insert(target) {
                    violations.push(InvariantViolation::DuplicateEdge {
                        from: path.clone(),
                        to: self.graph[target].clone(),
                    });
                }
            }
        }

        violations.sort();
        violations
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            documents: self
                .index
                .iter()
                .map(|(path, &node)| {
                    (
                        path.clone(),
                        DocumentEdges {
                            references_to: self.neighbor_paths(node, Outgoing),
                            referenced_by: self.neighbor_paths(node, Incoming),
                        },
                    )
                })
                .collect(),
        }
    }

    fn node(&self, path: &Path) -> Result<NodeIndex> {
        self.index
            .get(path)
            .copied()
            .ok_or_else(|| GraphError::NotTracked(path.to_path_buf()))
    }

    fn neighbor_paths(&self, node: NodeIndex, direction: Direction) -> Vec<PathBuf> {
        self.graph
            .neighbors_directed(node, direction)
            .map(|neighbor| self.graph[neighbor].clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn p(name: &str) -> PathBuf {
        PathBuf::from(format!("/site/{name}"))
    }

    fn graph_with(names: &[&str]) -> ReferenceGraph {
        let mut graph = ReferenceGraph::new();
        for name in names {
            graph.track(p(name));
        }
        graph
    }

    #[test]
    fn upsert_records_both_halves() {
        let mut graph = graph_with(&["main.less", "shared.less"]);
        let delta = graph
            .upsert_edges(&p("main.less"), [p("shared.less")])
            .unwrap();

        assert_eq!(delta.added, vec![p("shared.less")]);
        assert_eq!(graph.referenced_by(&p("shared.less")).unwrap(), vec![p("main.less")]);
        assert!(graph.check_invariants().is_empty());
    }

    #[test]
    fn upsert_drops_untracked_targets() {
        let mut graph = graph_with(&["main.less"]);
        let delta = graph
            .upsert_edges(&p("main.less"), [p("missing.less")])
            .unwrap();

        assert!(delta.is_empty());
        assert_eq!(delta.ignored, vec![p("missing.less")]);
        assert!(graph.references_to(&p("main.less")).unwrap().is_empty());
    }

    #[test]
    fn upsert_applies_only_the_difference() {
        let mut graph = graph_with(&["a.less", "b.less", "c.less"]);
        graph
            .upsert_edges(&p("a.less"), [p("b.less"), p("c.less")])
            .unwrap();
        let delta = graph.upsert_edges(&p("a.less"), [p("c.less")]).unwrap();

        assert_eq!(delta.removed, vec![p("b.less")]);
        assert!(delta.added.is_empty());
        assert!(graph.referenced_by(&p("b.less")).unwrap().is_empty());
        assert_eq!(graph.referenced_by(&p("c.less")).unwrap(), vec![p("a.less")]);
    }

    #[test]
    fn upsert_on_untracked_origin_fails() {
        let mut graph = ReferenceGraph::new();
        let err = graph.upsert_edges(&p("a.less"), []).unwrap_err();
        assert_eq!(err, GraphError::NotTracked(p("a.less")));
    }

    #[test]
    fn untrack_removes_edges_from_neighbors() {
        let mut graph = graph_with(&["a.less", "b.less", "c.less"]);
        graph.upsert_edges(&p("a.less"), [p("b.less")]).unwrap();
        graph.upsert_edges(&p("b.less"), [p("c.less")]).unwrap();

        graph.untrack(&p("b.less"));

        assert!(graph.references_to(&p("a.less")).unwrap().is_empty());
        assert!(graph.referenced_by(&p("c.less")).unwrap().is_empty());
        assert!(graph.check_invariants().is_empty());
    }

    #[test]
    fn closure_starts_at_origin_and_follows_importers() {
        let mut graph = graph_with(&["main.less", "theme.less", "shared.less", "other.less"]);
        graph.upsert_edges(&p("main.less"), [p("theme.less")]).unwrap();
        graph.upsert_edges(&p("theme.less"), [p("shared.less")]).unwrap();

        assert_eq!(
            graph.affected_closure(&p("shared.less")),
            vec![p("shared.less"), p("theme.less"), p("main.less")]
        );
        assert_eq!(graph.affected_closure(&p("other.less")), vec![p("other.less")]);
    }

    #[test]
    fn closure_terminates_on_cycles() {
        let mut graph = graph_with(&["a.less", "b.less"]);
        graph.upsert_edges(&p("a.less"), [p("b.less")]).unwrap();
        graph.upsert_edges(&p("b.less"), [p("a.less")]).unwrap();

        assert_eq!(graph.affected_closure(&p("a.less")), vec![p("a.less"), p("b.less")]);
    }

    #[test]
    fn self_import_is_listed_once() {
        let mut graph = graph_with(&["a.less"]);
        graph.upsert_edges(&p("a.less"), [p("a.less")]).unwrap();

        assert_eq!(graph.affected_closure(&p("a.less")), vec![p("a.less")]);
        assert!(graph.check_invariants().is_empty());
    }

    #[test]
    fn closure_of_untracked_path_is_just_the_origin() {
        let graph = ReferenceGraph::new();
        assert_eq!(graph.affected_closure(&p("x.less")), vec![p("x.less")]);
    }

    #[test]
    fn retracked_path_starts_without_edges() {
        let mut graph = graph_with(&["a.less", "b.less"]);
        graph.upsert_edges(&p("a.less"), [p("b.less")]).unwrap();

        let edges = graph.untrack(&p("b.less")).unwrap();
        assert!(edges.referenced_by.contains(&p("a.less")));
        assert!(graph.track(p("b.less")));

        assert!(graph.referenced_by(&p("b.less")).unwrap().is_empty());
        assert!(graph.references_to(&p("a.less")).unwrap().is_empty());
        assert!(graph.check_invariants().is_empty());
    }

    #[test]
    fn closure_reaches_every_importer_once() {
        let mut graph = graph_with(&["a.less", "b.less", "c.less", "base.less"]);
        graph.upsert_edges(&p("a.less"), [p("base.less")]).unwrap();
        graph.upsert_edges(&p("b.less"), [p("base.less")]).unwrap();
        graph.upsert_edges(&p("c.less"), [p("a.less"), p("b.less")]).unwrap();

        let closure = graph.affected_closure(&p("base.less"));
        assert_eq!(closure.first(), Some(&p("base.less")));
        assert_eq!(closure.last(), Some(&p("c.less")));

        let mut sorted = closure.clone();
        sorted.sort();
        assert_eq!(
            sorted,
            vec![p("a.less"), p("b.less"), p("base.less"), p("c.less")]
        );
    }
}
