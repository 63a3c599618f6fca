// Copyright (c) 2025 ETH Zurich

//! The unit instantiation graph.
//!
//! Two maps over unit names: `children[u]` holds the names `u` instantiates,
//! `parents[u]` the names that instantiate `u`. Every name keyed in one map
//! is keyed in both, and edges are consistent between the two. Cycles are
//! permitted; they arise from recursive stubs and do not block ranking.

use std::collections::{BTreeSet, VecDeque};

use indexmap::IndexMap;

use crate::extract::Extraction;

/// The instantiation graph over extracted units.
#[derive(Clone, Debug, Default)]
pub struct UnitGraph {
    children: IndexMap<String, Vec<String>>,
    parents: IndexMap<String, Vec<String>>,
}

impl UnitGraph {
    /// Construct a graph from the canonical shape `name → list of children`.
    ///
    /// This is the single entry point; callers at boundaries coerce whatever
    /// shape they hold into this one. Edges to names absent from the key set
    /// are dropped (they surface later as compiler diagnostics). The inverse
    /// map is derived here, which keeps the two maps consistent by
    /// construction.
    pub fn new(children: IndexMap<String, Vec<String>>) -> Self {
        let mut parents: IndexMap<String, Vec<String>> = children
            .keys()
            .map(|k| (k.clone(), Vec::new()))
            .collect();
        let mut filtered: IndexMap<String, Vec<String>> = IndexMap::new();
        for (parent, kids) in &children {
            let kept: Vec<String> = kids
                .iter()
                .filter(|k| children.contains_key(*k) && *k != parent)
                .cloned()
                .collect();
            for kid in &kept {
                let ps = parents.get_mut(kid).unwrap();
                if !ps.contains(parent) {
                    ps.push(parent.clone());
                }
            }
            filtered.insert(parent.clone(), kept);
        }
        UnitGraph {
            children: filtered,
            parents,
        }
    }

    /// Build the graph from extractor output.
    ///
    /// Every instantiation recognized in a file becomes an edge from each
    /// unit declared in that file, provided the instantiated name is itself
    /// in the unit table.
    pub fn from_extraction(extraction: &Extraction) -> Self {
        let mut children: IndexMap<String, Vec<String>> = IndexMap::new();
        for unit in &extraction.units {
            children.entry(unit.name.clone()).or_default();
        }
        for unit in &extraction.units {
            if let Some(insts) = extraction.instantiations.get(&unit.file) {
                let kids = children.get_mut(&unit.name).unwrap();
                for inst in insts {
                    if !kids.contains(inst) {
                        kids.push(inst.clone());
                    }
                }
            }
        }
        UnitGraph::new(children)
    }

    /// The names `name` instantiates.
    pub fn children_of(&self, name: &str) -> &[String] {
        self.children.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The names that instantiate `name`.
    pub fn parents_of(&self, name: &str) -> &[String] {
        self.parents.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// All unit names, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(|s| s.as_str())
    }

    /// Whether the graph contains `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    /// The number of units in the graph.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of distinct units reachable from `start`, excluding `start`.
    ///
    /// BFS over `children`; bounded by the visited set, so cycles terminate.
    pub fn reachable_count(&self, start: &str) -> usize {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            for child in self.children_of(current) {
                if child != start && seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph(edges: &[(&str, &[&str])]) -> UnitGraph {
        UnitGraph::new(
            edges
                .iter()
                .map(|(n, kids)| {
                    (
                        n.to_string(),
                        kids.iter().map(|k| k.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn edges_are_consistent() {
        let g = graph(&[("cpu", &["alu", "regfile"]), ("alu", &[]), ("regfile", &[])]);
        assert_eq!(g.children_of("cpu"), &["alu", "regfile"]);
        assert_eq!(g.parents_of("alu"), &["cpu"]);
        assert_eq!(g.parents_of("cpu"), &[] as &[String]);
    }

    #[test]
    fn unknown_children_are_dropped() {
        let g = graph(&[("cpu", &["alu", "ghost"]), ("alu", &[])]);
        assert_eq!(g.children_of("cpu"), &["alu"]);
        assert!(!g.contains("ghost"));
    }

    #[test]
    fn reachable_count_excludes_start() {
        let g = graph(&[
            ("top", &["cpu"]),
            ("cpu", &["alu", "regfile"]),
            ("alu", &[]),
            ("regfile", &[]),
        ]);
        assert_eq!(g.reachable_count("top"), 3);
        assert_eq!(g.reachable_count("alu"), 0);
    }

    #[test]
    fn cycles_terminate() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        assert_eq!(g.reachable_count("a"), 1);
        assert_eq!(g.reachable_count("b"), 1);
    }

    #[test]
    fn self_edges_are_dropped() {
        let g = graph(&[("rec", &["rec", "leaf"]), ("leaf", &[])]);
        assert_eq!(g.children_of("rec"), &["leaf"]);
        assert_eq!(g.reachable_count("rec"), 1);
    }
}
