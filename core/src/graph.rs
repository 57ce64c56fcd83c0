use std::collections::HashMap;

use tracing::debug;

use crate::error::GraphError;

/// External node identifier, opaque to the engine.
pub type NodeId = u64;

/// Dense node position assigned at insertion. All per-source state is
/// indexed by this.
pub type NodeIndex = u32;

/// Interned accumulator field index (position in the graph's field list).
pub type AccumulatorId = u16;

/// Maximum number of distinct accumulator fields per graph.
pub const MAX_ACCUMULATORS: usize = AccumulatorId::MAX as usize;

/// Default node weight when the caller supplies none.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Planar node location, needed only for straightness.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Location) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Per-node data.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: NodeId,
    pub weight: f64,
    pub location: Option<Location>,
}

/// A directed arc in the adjacency list. Undirected edges are stored as
/// one arc in each direction with identical cost and contributions.
///
/// `slot` indexes the graph's flat contribution buffer; the arc's
/// accumulator contributions are `contributions[slot * k .. slot * k + k]`.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub target: NodeIndex,
    pub cost: f64,
    slot: u32,
}

/// Bulk-load record for an undirected edge with named accumulator
/// contributions.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeRecord {
    pub from: NodeId,
    pub to: NodeId,
    pub cost: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub accumulations: Vec<(String, f64)>,
}

/// Raw adjacency row as produced by an upstream adjacency-list builder.
/// Unlike [`EdgeRecord`], rows describing self loops or negative distances
/// are tolerated and skipped by [`Graph::load_adjacency`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdjacencyRow {
    pub origin: NodeId,
    pub destination: NodeId,
    pub distance: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub accumulations: HashMap<String, f64>,
}

/// Outcome of [`Graph::load_adjacency`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub rows: usize,
    pub edges_added: usize,
    pub skipped_self_loops: usize,
    pub skipped_negative: usize,
}

/// In-memory undirected spatial network: adjacency lists, node weights and
/// locations, and interned accumulator fields.
///
/// The graph is read-only once a centrality run starts; results are
/// returned separately in a [`CentralityResult`](crate::CentralityResult).
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<NodeInfo>,
    adjacency: Vec<Vec<Edge>>,
    id_index: HashMap<NodeId, NodeIndex>,
    accumulators: Vec<String>,
    accumulator_map: HashMap<String, AccumulatorId>,
    contributions: Vec<f64>,
    edge_count: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve room for `node_count` more nodes and `edge_count` more
    /// undirected edges. Call after declaring accumulators so contribution
    /// storage is sized too.
    pub fn reserve(&mut self, node_count: usize, edge_count: usize) {
        self.nodes.reserve(node_count);
        self.adjacency.reserve(node_count);
        self.id_index.reserve(node_count);
        self.contributions.reserve(edge_count * self.accumulators.len());
    }

    /// Create a graph whose edges each carry one contribution per field.
    pub fn with_accumulators<I, S>(fields: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut graph = Self::new();
        for field in fields {
            graph.intern_accumulator(field.into())?;
        }
        Ok(graph)
    }

    fn intern_accumulator(&mut self, field: String) -> Result<AccumulatorId, GraphError> {
        if self.accumulator_map.contains_key(&field) {
            return Err(GraphError::DuplicateAccumulator(field));
        }
        if self.accumulators.len() >= MAX_ACCUMULATORS {
            return Err(GraphError::AccumulatorArity {
                expected: MAX_ACCUMULATORS,
                found: self.accumulators.len() + 1,
            });
        }
        let id = self.accumulators.len() as AccumulatorId;
        self.accumulator_map.insert(field.clone(), id);
        self.accumulators.push(field);
        Ok(id)
    }

    /// Declared accumulator field names, in [`AccumulatorId`] order.
    pub fn accumulator_fields(&self) -> &[String] {
        &self.accumulators
    }

    pub fn accumulator_id(&self, field: &str) -> Option<AccumulatorId> {
        self.accumulator_map.get(field).copied()
    }

    pub fn accumulator_count(&self) -> usize {
        self.accumulators.len()
    }

    /// Register a node, or update the weight of an existing one.
    pub fn add_node(&mut self, id: NodeId, weight: f64) -> Result<NodeIndex, GraphError> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(GraphError::InvalidWeight { id, weight });
        }
        let index = self.ensure_node(id)?;
        self.nodes[index as usize].weight = weight;
        Ok(index)
    }

    /// Get or create a node with the default weight.
    fn ensure_node(&mut self, id: NodeId) -> Result<NodeIndex, GraphError> {
        if let Some(&index) = self.id_index.get(&id) {
            return Ok(index);
        }
        if self.nodes.len() >= NodeIndex::MAX as usize {
            return Err(GraphError::TooManyNodes {
                max: NodeIndex::MAX as usize,
            });
        }
        let index = self.nodes.len() as NodeIndex;
        self.nodes.push(NodeInfo {
            id,
            weight: DEFAULT_WEIGHT,
            location: None,
        });
        self.adjacency.push(Vec::new());
        self.id_index.insert(id, index);
        Ok(index)
    }

    pub fn set_location(&mut self, id: NodeId, x: f64, y: f64) -> Result<(), GraphError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(GraphError::InvalidLocation { id, x, y });
        }
        let index = self.index_of(id).ok_or(GraphError::UnknownNode(id))?;
        self.nodes[index as usize].location = Some(Location::new(x, y));
        Ok(())
    }

    /// Add an undirected edge as two symmetric arcs. Missing endpoints are
    /// created with the default weight.
    ///
    /// `contributions` holds one value per declared accumulator field, in
    /// declaration order. Returns `false` if an identical edge already
    /// exists (adjacency is set-valued).
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        cost: f64,
        contributions: &[f64],
    ) -> Result<bool, GraphError> {
        if from == to {
            return Err(GraphError::SelfLoop(from));
        }
        if !cost.is_finite() || cost < 0.0 {
            return Err(GraphError::InvalidCost { from, to, cost });
        }
        let k = self.accumulators.len();
        if contributions.len() != k {
            return Err(GraphError::AccumulatorArity {
                expected: k,
                found: contributions.len(),
            });
        }
        for (field, &value) in self.accumulators.iter().zip(contributions) {
            if !value.is_finite() || value < 0.0 {
                return Err(GraphError::InvalidContribution {
                    field: field.clone(),
                    value,
                });
            }
        }

        let a = self.ensure_node(from)?;
        let b = self.ensure_node(to)?;

        if self.has_identical_arc(a, b, cost, contributions) {
            return Ok(false);
        }

        let slot = (self.contributions.len() / k.max(1)) as u32;
        if k > 0 {
            self.contributions.extend_from_slice(contributions);
        }
        self.adjacency[a as usize].push(Edge { target: b, cost, slot });
        self.adjacency[b as usize].push(Edge { target: a, cost, slot });
        self.edge_count += 1;
        Ok(true)
    }

    fn has_identical_arc(
        &self,
        a: NodeIndex,
        b: NodeIndex,
        cost: f64,
        contributions: &[f64],
    ) -> bool {
        self.adjacency[a as usize].iter().any(|e| {
            e.target == b
                && e.cost.to_bits() == cost.to_bits()
                && self
                    .contributions(e)
                    .iter()
                    .zip(contributions)
                    .all(|(x, y)| x.to_bits() == y.to_bits())
        })
    }

    /// Reorder named accumulations into declaration order. A record whose
    /// key set differs from the declared fields is a contract violation.
    fn resolve_accumulations<'a, I>(&self, named: I, len: usize) -> Result<Vec<f64>, GraphError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut values: Vec<Option<f64>> = vec![None; self.accumulators.len()];
        let mut seen = 0usize;
        let mut mismatch = len != self.accumulators.len();
        let mut found = Vec::with_capacity(len);

        for (field, value) in named {
            found.push(field.to_string());
            match self.accumulator_map.get(field) {
                Some(&id) if values[id as usize].is_none() => {
                    values[id as usize] = Some(value);
                    seen += 1;
                }
                _ => mismatch = true,
            }
        }

        if mismatch || seen != self.accumulators.len() {
            found.sort();
            let mut expected = self.accumulators.clone();
            expected.sort();
            return Err(GraphError::AccumulatorMismatch { expected, found });
        }
        Ok(values.into_iter().flatten().collect())
    }

    /// Bulk load undirected edges with named accumulations.
    pub fn load_edges<I>(&mut self, edges: I) -> Result<usize, GraphError>
    where
        I: IntoIterator<Item = EdgeRecord>,
    {
        let mut added = 0;
        for record in edges {
            let values = self.resolve_accumulations(
                record.accumulations.iter().map(|(f, v)| (f.as_str(), *v)),
                record.accumulations.len(),
            )?;
            if self.add_edge(record.from, record.to, record.cost, &values)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Load raw adjacency rows. Both endpoints of every row are registered
    /// as nodes; rows that would create a self loop or carry a negative
    /// distance are skipped. Mismatched accumulation keys are still fatal.
    pub fn load_adjacency<I>(&mut self, rows: I) -> Result<LoadSummary, GraphError>
    where
        I: IntoIterator<Item = AdjacencyRow>,
    {
        let mut summary = LoadSummary::default();
        for row in rows {
            summary.rows += 1;
            self.ensure_node(row.origin)?;
            self.ensure_node(row.destination)?;

            if row.origin == row.destination {
                summary.skipped_self_loops += 1;
                continue;
            }
            if row.distance < 0.0 {
                summary.skipped_negative += 1;
                continue;
            }

            let values = self.resolve_accumulations(
                row.accumulations.iter().map(|(f, v)| (f.as_str(), *v)),
                row.accumulations.len(),
            )?;
            if self.add_edge(row.origin, row.destination, row.distance, &values)? {
                summary.edges_added += 1;
            }
        }

        if summary.skipped_self_loops > 0 || summary.skipped_negative > 0 {
            debug!(
                self_loops = summary.skipped_self_loops,
                negative = summary.skipped_negative,
                "skipped adjacency rows"
            );
        }
        Ok(summary)
    }

    /// Resolve an external id to its dense index.
    pub fn index_of(&self, id: NodeId) -> Option<NodeIndex> {
        self.id_index.get(&id).copied()
    }

    pub fn node(&self, index: NodeIndex) -> &NodeInfo {
        &self.nodes[index as usize]
    }

    /// Look up node data by external id.
    pub fn node_by_id(&self, id: NodeId) -> Option<&NodeInfo> {
        self.index_of(id).map(|i| self.node(i))
    }

    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    pub fn weight(&self, index: NodeIndex) -> f64 {
        self.nodes[index as usize].weight
    }

    pub fn location(&self, index: NodeIndex) -> Option<Location> {
        self.nodes[index as usize].location
    }

    /// Outgoing arcs of a node.
    pub fn neighbors(&self, index: NodeIndex) -> &[Edge] {
        &self.adjacency[index as usize]
    }

    /// Accumulator contributions of an arc, in declaration order.
    pub fn contributions(&self, edge: &Edge) -> &[f64] {
        let k = self.accumulators.len();
        let start = edge.slot as usize * k;
        &self.contributions[start..start + k]
    }

    /// True when every node carries a location (straightness precondition).
    pub fn has_all_locations(&self) -> bool {
        self.nodes.iter().all(|n| n.location.is_some())
    }

    pub fn total_weight(&self) -> f64 {
        self.nodes.iter().map(|n| n.weight).sum()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Number of directed arcs (twice the edge count).
    pub fn arc_count(&self) -> usize {
        self.adjacency.iter().map(|v| v.len()).sum()
    }

    /// Approximate memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        use std::mem::size_of;

        let nodes_mem = self.nodes.len() * (size_of::<NodeInfo>() + size_of::<Vec<Edge>>());
        let arcs_mem = self.arc_count() * size_of::<Edge>();
        let index_mem = self.id_index.len() * (size_of::<NodeId>() + size_of::<NodeIndex>() + 16);
        let contrib_mem = self.contributions.len() * size_of::<f64>();

        nodes_mem + arcs_mem + index_mem + contrib_mem
    }
}
