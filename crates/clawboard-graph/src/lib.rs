//! # clawboard-graph
//!
//! Builds the entity-relationship graph ("clawgraph") over a recent window
//! of topics, tasks, and logs. Pure functions: callers supply the rows and
//! stamp the timestamp.

mod builder;
mod entities;

pub use builder::{build_graph, Graph, GraphEdge, GraphNode, GraphOptions, GraphStats};
pub use entities::{extract_entities, slug};
