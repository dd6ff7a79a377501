//! Dependency Graph (C3).

mod dependency_graph;

pub use dependency_graph::{DependencyGraph, GraphStats};
