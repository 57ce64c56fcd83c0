use thiserror::Error;

use crate::graph::NodeId;

/// Contract violations while building a [`Graph`](crate::Graph).
///
/// These are never recovered from inside the engine: the caller supplied a
/// graph that does not satisfy the input contract.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("node {0} is not in the graph")]
    UnknownNode(NodeId),

    #[error("node {0} cannot be its own neighbor")]
    SelfLoop(NodeId),

    #[error("edge {from} -> {to} has invalid cost {cost} (must be finite and non-negative)")]
    InvalidCost { from: NodeId, to: NodeId, cost: f64 },

    #[error("node {id} has invalid weight {weight} (must be finite and non-negative)")]
    InvalidWeight { id: NodeId, weight: f64 },

    #[error("node {id} has non-finite location ({x}, {y})")]
    InvalidLocation { id: NodeId, x: f64, y: f64 },

    #[error("accumulator fields {found:?} do not match the graph's fields {expected:?}")]
    AccumulatorMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("edge carries {found} accumulator contributions, graph declares {expected}")]
    AccumulatorArity { expected: usize, found: usize },

    #[error("accumulator contribution for '{field}' is {value} (must be finite and non-negative)")]
    InvalidContribution { field: String, value: f64 },

    #[error("duplicate accumulator field '{0}'")]
    DuplicateAccumulator(String),

    #[error("graph exceeded maximum of {max} nodes")]
    TooManyNodes { max: usize },
}

/// Invalid run parameters, detected before any source is processed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("radius must be positive and finite, got {0}")]
    InvalidRadius(f64),

    #[error("beta must be positive and finite, got {0}")]
    InvalidBeta(f64),

    #[error("thread count must be at least 1")]
    InvalidThreads,

    #[error("unknown measure '{0}'")]
    UnknownMeasure(String),

    #[error("accumulator field '{0}' is not declared on the graph")]
    UnknownAccumulator(String),

    #[error("accumulator field '{0}' requested more than once")]
    DuplicateAccumulator(String),
}

/// Failures of a centrality run as a whole.
#[derive(Debug, Error)]
pub enum CentralityError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("centrality run cancelled after {completed} of {total} sources")]
    Cancelled { completed: usize, total: usize },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
