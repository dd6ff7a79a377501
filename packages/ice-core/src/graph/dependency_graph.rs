//! Dependency Graph (C3, spec.md §4.3).
//!
//! Grounded on the teacher's `codegraph-ir::features::cross_file::dep_graph`, which
//! backs a file-level `petgraph::DiGraph` with Tarjan SCC for cycles and Kahn's
//! algorithm for topological order. Generalized here to also maintain an explicit
//! reverse-adjacency map (so `affectedFiles`/I1 are checkable without walking
//! petgraph's internal index) and to use iterative BFS instead of petgraph's
//! recursive DFS helpers, per spec.md §5 ("stack depth must not be bounded by
//! language call stack").

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::types::{CyclicDependency, DependencyNode, FilePath};

#[derive(Clone)]
pub struct DependencyGraph {
    graph: DiGraph<FilePath, ()>,
    index: HashMap<FilePath, NodeIndex>,
    meta: HashMap<FilePath, DependencyNode>,
}

#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub max_depth: usize,
    pub average_dependencies: f64,
    pub isolated_nodes: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            meta: HashMap::new(),
        }
    }

    /// Idempotent: ensures `path` has a node, creating default metadata if absent.
    pub fn add_node(&mut self, path: FilePath, size: u64, mtime: std::time::SystemTime) {
        if !self.index.contains_key(&path) {
            let idx = self.graph.add_node(path.clone());
            self.index.insert(path.clone(), idx);
            self.meta
                .insert(path.clone(), DependencyNode::new(path, size, mtime));
        }
    }

    pub fn contains(&self, path: &FilePath) -> bool {
        self.index.contains_key(path)
    }

    pub fn node(&self, path: &FilePath) -> Option<&DependencyNode> {
        self.meta.get(path)
    }

    /// Adds `to` to `forward[from]` and `from` to `reverse[to]`. Duplicate edges are
    /// deduplicated. Does not create the `to` node implicitly (spec.md §4.3): both
    /// endpoints must already be registered via `add_node`, so an edge to an
    /// unresolved or not-yet-scanned path is silently skipped rather than fabricating
    /// placeholder metadata for it.
    pub fn add_edge(&mut self, from: &FilePath, to: &FilePath) {
        let (Some(&from_idx), Some(&to_idx)) = (self.index.get(from), self.index.get(to)) else {
            return;
        };

        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }

        self.meta
            .get_mut(from)
            .unwrap()
            .dependencies
            .insert(to.clone());
        self.meta
            .get_mut(to)
            .unwrap()
            .dependents
            .insert(from.clone());
    }

    /// Removes every edge referencing `from` that is not in `keep`, then adds edges to
    /// every target in `keep` that isn't already present. Used by incremental reparse
    /// (spec.md §4.4 "Incremental reparse").
    pub fn set_dependencies(&mut self, from: &FilePath, keep: &HashSet<FilePath>) {
        let Some(node) = self.meta.get(from).cloned() else {
            return;
        };
        for stale in node.dependencies.difference(keep) {
            self.remove_edge(from, stale);
        }
        for fresh in keep.difference(&node.dependencies) {
            self.add_edge(from, fresh);
        }
    }

    fn remove_edge(&mut self, from: &FilePath, to: &FilePath) {
        if let (Some(&from_idx), Some(&to_idx)) = (self.index.get(from), self.index.get(to)) {
            if let Some(edge) = self.graph.find_edge(from_idx, to_idx) {
                self.graph.remove_edge(edge);
            }
        }
        if let Some(node) = self.meta.get_mut(from) {
            node.dependencies.remove(to);
        }
        if let Some(node) = self.meta.get_mut(to) {
            node.dependents.remove(from);
        }
    }

    /// Removes a node entirely: its edges in both directions and its metadata. Used
    /// when a project rescan omits a previously-seen file, or on a `Deleted` change
    /// event (spec.md §3, §6).
    pub fn remove_node(&mut self, path: &FilePath) {
        let Some(node) = self.meta.remove(path) else {
            return;
        };
        for dep in node.dependencies.iter() {
            if let Some(d) = self.meta.get_mut(dep) {
                d.dependents.remove(path);
            }
        }
        for dep in node.dependents.iter() {
            if let Some(d) = self.meta.get_mut(dep) {
                d.dependencies.remove(path);
            }
        }
        if let Some(idx) = self.index.remove(path) {
            self.graph.remove_node(idx);
            // petgraph swap-removes, which can reassign the last node's index; rebuild
            // our index map for the (at most one) affected path.
            self.reindex_after_removal();
        }
    }

    fn reindex_after_removal(&mut self) {
        self.index.clear();
        for idx in self.graph.node_indices() {
            self.index.insert(self.graph[idx].clone(), idx);
        }
    }

    pub fn dependencies(&self, path: &FilePath) -> HashSet<FilePath> {
        self.meta
            .get(path)
            .map(|n| n.dependencies.clone())
            .unwrap_or_default()
    }

    pub fn dependents(&self, path: &FilePath) -> HashSet<FilePath> {
        self.meta
            .get(path)
            .map(|n| n.dependents.clone())
            .unwrap_or_default()
    }

    /// Depth-first (iterative) reachability over forward edges, excluding `x` (I4).
    pub fn transitive_dependencies(&self, path: &FilePath) -> HashSet<FilePath> {
        self.reachable(path, true)
    }

    /// Depth-first (iterative) reachability over reverse edges, excluding `x` — the set
    /// of files whose contexts must be rebuilt when `x` changes (I4).
    pub fn affected_files(&self, path: &FilePath) -> HashSet<FilePath> {
        self.reachable(path, false)
    }

    fn reachable(&self, start: &FilePath, forward: bool) -> HashSet<FilePath> {
        let mut visited = HashSet::new();
        let mut stack = vec![start.clone()];
        while let Some(current) = stack.pop() {
            let neighbors = if forward {
                self.dependencies(&current)
            } else {
                self.dependents(&current)
            };
            for n in neighbors {
                if n != *start && visited.insert(n.clone()) {
                    stack.push(n);
                }
            }
        }
        visited
    }

    /// Shortest-path hop count from `from` to `to`; `-1` if unreachable, `0` if equal.
    pub fn dependency_depth(&self, from: &FilePath, to: &FilePath) -> i64 {
        if from == to {
            return 0;
        }
        let mut visited: HashSet<FilePath> = HashSet::new();
        visited.insert(from.clone());
        let mut frontier = VecDeque::new();
        frontier.push_back((from.clone(), 0i64));
        while let Some((current, depth)) = frontier.pop_front() {
            for dep in self.dependencies(&current) {
                if dep == *to {
                    return depth + 1;
                }
                if visited.insert(dep.clone()) {
                    frontier.push_back((dep, depth + 1));
                }
            }
        }
        -1
    }

    pub fn is_dependent_on(&self, a: &FilePath, b: &FilePath) -> bool {
        self.dependency_depth(a, b) > 0
    }

    /// Strongly-connected components of size ≥ 2, plus explicit self-loops. Visits
    /// every node; deterministic given petgraph's node-insertion order (I5/"Cycle
    /// stability" law).
    pub fn detect_cycles(&self) -> Vec<CyclicDependency> {
        let mut cycles = Vec::new();

        for idx in self.graph.node_indices() {
            if self.graph.contains_edge(idx, idx) {
                cycles.push(CyclicDependency::self_loop(self.graph[idx].clone()));
            }
        }

        let sccs = tarjan_scc(&self.graph);
        for scc in sccs {
            if scc.len() >= 2 {
                let mut cycle: Vec<FilePath> = scc.iter().map(|&i| self.graph[i].clone()).collect();
                cycle.sort();
                cycles.push(CyclicDependency::scc(cycle));
            }
        }

        cycles
    }

    /// Iterative DFS topological order over just the nodes in `subset`; a dependency of
    /// `x` that is also in `subset` precedes `x`. Nodes participating in a cycle (within
    /// the subset) are still emitted, just in an implementation-defined relative order
    /// (I5's carve-out).
    pub fn topological_order(&self, subset: &[FilePath]) -> Vec<FilePath> {
        let subset_set: HashSet<&FilePath> = subset.iter().collect();
        let mut visited: HashSet<FilePath> = HashSet::new();
        let mut order = Vec::with_capacity(subset.len());

        for start in subset {
            if visited.contains(start) {
                continue;
            }
            // Explicit stack of (node, next-child-index-to-visit) frames.
            let mut stack: Vec<(FilePath, Vec<FilePath>, usize)> = Vec::new();
            let children = |p: &FilePath| -> Vec<FilePath> {
                let mut c: Vec<FilePath> = self
                    .dependencies(p)
                    .into_iter()
                    .filter(|d| subset_set.contains(d))
                    .collect();
                c.sort();
                c
            };
            stack.push((start.clone(), children(start), 0));
            visited.insert(start.clone());

            while let Some((node, children_vec, pos)) = stack.last_mut() {
                if *pos < children_vec.len() {
                    let next = children_vec[*pos].clone();
                    *pos += 1;
                    if visited.insert(next.clone()) {
                        let next_children = children(&next);
                        stack.push((next, next_children, 0));
                    }
                } else {
                    order.push(node.clone());
                    stack.pop();
                }
            }
        }

        order
    }

    pub fn stats(&self) -> GraphStats {
        let total_nodes = self.meta.len();
        let total_edges = self.graph.edge_count();
        let isolated_nodes = self
            .meta
            .values()
            .filter(|n| n.dependencies.is_empty() && n.dependents.is_empty())
            .count();
        let average_dependencies = if total_nodes == 0 {
            0.0
        } else {
            self.meta
                .values()
                .map(|n| n.dependencies.len())
                .sum::<usize>() as f64
                / total_nodes as f64
        };
        let max_depth = self
            .meta
            .keys()
            .map(|p| self.longest_chain_from(p))
            .max()
            .unwrap_or(0);

        GraphStats {
            total_nodes,
            total_edges,
            max_depth,
            average_dependencies,
            isolated_nodes,
        }
    }

    fn longest_chain_from(&self, start: &FilePath) -> usize {
        // Bounded BFS layer count; cycles can't inflate this past total_nodes because
        // `visited` blocks revisits.
        let mut visited = HashSet::new();
        visited.insert(start.clone());
        let mut frontier = vec![start.clone()];
        let mut depth = 0;
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for p in &frontier {
                for dep in self.dependencies(p) {
                    if visited.insert(dep.clone()) {
                        next.push(dep);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            depth += 1;
            frontier = next;
        }
        depth
    }

    /// Stable textual digraph export for diagnostics (spec.md §6).
    pub fn to_dot(&self) -> String {
        let mut paths: Vec<&FilePath> = self.meta.keys().collect();
        paths.sort();

        let mut out = String::from("digraph {\n");
        for from in &paths {
            let mut deps: Vec<FilePath> = self.dependencies(from).into_iter().collect();
            deps.sort();
            for to in deps {
                out.push_str(&format!("  \"{from}\" -> \"{to}\";\n"));
            }
        }
        out.push_str("}\n");
        out
    }

    pub fn node_count(&self) -> usize {
        self.meta.len()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
