//! centrality-core: spatial-network centrality engine.
//!
//! Computes reach, gravity, betweenness, closeness and straightness for every
//! node of an undirected, weighted graph, optionally within a network radius,
//! with optional normalization and per-edge accumulator totals summed along
//! shortest paths.
//!
//! Each node acts as a source for a radius-bounded Dijkstra search fused with
//! Brandes' betweenness bookkeeping. Sources run in parallel on a rayon pool,
//! each worker reusing its own traversal scratch space.
//!
//! ```no_run
//! use centrality_core::{compute_centrality, CentralityConfig, Graph, MeasureSet, Radius};
//!
//! let mut graph = Graph::new();
//! graph.add_edge(1, 2, 1.0, &[]).unwrap();
//! graph.add_edge(2, 3, 1.0, &[]).unwrap();
//!
//! let config = CentralityConfig::new()
//!     .measures(MeasureSet::all())
//!     .radius(Radius::Within(500.0));
//! let result = compute_centrality(&graph, &config).unwrap();
//! println!("{:?}", result.get(2).and_then(|m| m.betweenness()));
//! ```

mod betweenness;
mod config;
mod control;
mod engine;
mod error;
mod graph;
mod measures;
mod normalize;
mod queue;
mod traversal;

pub use config::{eq_tol, lt_tol, CentralityConfig, Radius, DEFAULT_BETA, TOLERANCE};
pub use control::{CancellationToken, Progress, RunControl};
pub use engine::{compute_centrality, compute_centrality_with, CentralityResult};
pub use error::{CentralityError, ConfigError, GraphError};
pub use graph::{
    AccumulatorId, AdjacencyRow, Edge, EdgeRecord, Graph, LoadSummary, Location, NodeId, NodeIndex,
    NodeInfo, DEFAULT_WEIGHT, MAX_ACCUMULATORS,
};
pub use measures::{Measure, MeasureSet, NodeMeasures};
pub use normalize::normalized_value;
pub use queue::IndexedMinHeap;
pub use traversal::shortest_distances;
