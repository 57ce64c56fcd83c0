use std::collections::HashSet;

use crate::error::ConfigError;
use crate::graph::Graph;
use crate::measures::{Measure, MeasureSet, Plan};

/// Absolute tolerance separating a strictly shorter path from a tie.
pub const TOLERANCE: f64 = 1e-6;

/// Default gravity decay exponent.
pub const DEFAULT_BETA: f64 = 1.0;

/// True if `a` is shorter than `b` by more than [`TOLERANCE`].
#[inline]
pub fn lt_tol(a: f64, b: f64) -> bool {
    b - a > TOLERANCE
}

/// True if `a` and `b` are within [`TOLERANCE`] of each other.
#[inline]
pub fn eq_tol(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOLERANCE
}

/// Network-distance cutoff for a single source's search.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Radius {
    #[default]
    Unbounded,
    Within(f64),
}

impl Radius {
    /// Whether a node at distance `d` is inside the radius (inclusive).
    #[inline]
    pub fn contains(self, d: f64) -> bool {
        match self {
            Radius::Unbounded => true,
            Radius::Within(r) => d <= r,
        }
    }
}

/// Parameters of a centrality run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CentralityConfig {
    /// Measures reported in the output.
    pub measures: MeasureSet,
    pub radius: Radius,
    /// Gravity decay exponent; only read when gravity is computed.
    pub beta: f64,
    /// Measures to also report normalized. Implies computation.
    pub normalize: MeasureSet,
    /// Accumulator fields to total, in output order.
    pub accumulators: Vec<String>,
    /// Worker count. `None` uses the global rayon pool.
    pub threads: Option<usize>,
}

impl Default for CentralityConfig {
    fn default() -> Self {
        Self {
            measures: MeasureSet::empty(),
            radius: Radius::Unbounded,
            beta: DEFAULT_BETA,
            normalize: MeasureSet::empty(),
            accumulators: Vec::new(),
            threads: None,
        }
    }
}

impl CentralityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn measure(mut self, measure: Measure) -> Self {
        self.measures.insert(measure);
        self
    }

    pub fn measures(mut self, measures: MeasureSet) -> Self {
        self.measures = measures;
        self
    }

    pub fn radius(mut self, radius: Radius) -> Self {
        self.radius = radius;
        self
    }

    pub fn beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn normalize(mut self, measures: MeasureSet) -> Self {
        self.normalize = measures;
        self
    }

    pub fn accumulate(mut self, field: impl Into<String>) -> Self {
        self.accumulators.push(field.into());
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Measures that must be computed: reported ones plus normalized ones.
    pub fn computed(&self) -> MeasureSet {
        self.measures.union(self.normalize)
    }

    /// Check parameters that do not depend on the graph.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Radius::Within(r) = self.radius {
            if !r.is_finite() || r <= 0.0 {
                return Err(ConfigError::InvalidRadius(r));
            }
        }
        if self.computed().contains(Measure::Gravity)
            && (!self.beta.is_finite() || self.beta <= 0.0)
        {
            return Err(ConfigError::InvalidBeta(self.beta));
        }
        if self.threads == Some(0) {
            return Err(ConfigError::InvalidThreads);
        }
        let mut seen = HashSet::with_capacity(self.accumulators.len());
        for field in &self.accumulators {
            if !seen.insert(field.as_str()) {
                return Err(ConfigError::DuplicateAccumulator(field.clone()));
            }
        }
        Ok(())
    }

    /// Validate against `graph` and resolve what each source must track.
    ///
    /// Straightness is dropped, without error, when any node lacks a
    /// location. Returns the plan and the set of measures actually computed.
    pub(crate) fn plan(&self, graph: &Graph) -> Result<(Plan, MeasureSet), ConfigError> {
        self.validate()?;

        let accumulators = self
            .accumulators
            .iter()
            .map(|field| {
                graph
                    .accumulator_id(field)
                    .map(|id| id as usize)
                    .ok_or_else(|| ConfigError::UnknownAccumulator(field.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut computed = self.computed();
        if computed.contains(Measure::Straightness) && !graph.has_all_locations() {
            tracing::debug!("straightness disabled: not every node has a location");
            computed.remove(Measure::Straightness);
        }

        let plan = Plan {
            gravity: computed.contains(Measure::Gravity),
            betweenness: computed.contains(Measure::Betweenness),
            closeness: computed.contains(Measure::Closeness),
            straightness: computed.contains(Measure::Straightness),
            beta: self.beta,
            accumulators,
        };
        Ok((plan, computed))
    }
}
