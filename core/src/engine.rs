use std::collections::HashMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, trace, warn};

use crate::betweenness::accumulate_dependencies;
use crate::config::{CentralityConfig, Radius};
use crate::control::RunControl;
use crate::error::CentralityError;
use crate::graph::{Graph, NodeId, NodeIndex};
use crate::measures::{Measure, MeasureSet, NodeMeasures, Plan, SourceTotals};
use crate::normalize::normalize;
use crate::traversal::{traverse, TraversalState};

/// Measures for every node of a graph, in node insertion order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CentralityResult {
    nodes: Vec<NodeMeasures>,
    #[cfg_attr(feature = "serde", serde(skip))]
    index: HashMap<NodeId, usize>,
    accumulators: Vec<String>,
    computed: MeasureSet,
    normalized: MeasureSet,
    sum_weights: f64,
}

impl CentralityResult {
    fn new(
        nodes: Vec<NodeMeasures>,
        accumulators: Vec<String>,
        computed: MeasureSet,
        normalized: MeasureSet,
        sum_weights: f64,
    ) -> Self {
        let index = nodes.iter().enumerate().map(|(i, m)| (m.id, i)).collect();
        Self {
            nodes,
            index,
            accumulators,
            computed,
            normalized,
            sum_weights,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeMeasures> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Total of accumulator `field` for node `id`, if both were part of
    /// the run.
    pub fn accumulation(&self, id: NodeId, field: &str) -> Option<f64> {
        let slot = self.accumulators.iter().position(|f| f == field)?;
        self.get(id)?.accumulations.get(slot).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeMeasures> {
        self.nodes.iter()
    }

    pub fn nodes(&self) -> &[NodeMeasures] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Accumulator fields totaled, in the order of each node's
    /// `accumulations`.
    pub fn accumulator_fields(&self) -> &[String] {
        &self.accumulators
    }

    /// Measures actually computed. Straightness is absent when the graph
    /// lacked locations.
    pub fn computed(&self) -> MeasureSet {
        self.computed
    }

    pub fn normalized(&self) -> MeasureSet {
        self.normalized
    }

    pub fn sum_weights(&self) -> f64 {
        self.sum_weights
    }
}

/// Compute the configured centrality measures for every node of `graph`.
pub fn compute_centrality(
    graph: &Graph,
    config: &CentralityConfig,
) -> Result<CentralityResult, CentralityError> {
    compute_centrality_with(graph, config, &RunControl::default())
}

/// Like [`compute_centrality`], with a handle to observe progress or cancel
/// the run between sources.
pub fn compute_centrality_with(
    graph: &Graph,
    config: &CentralityConfig,
    control: &RunControl,
) -> Result<CentralityResult, CentralityError> {
    let n = graph.node_count();
    control.progress.start(n);

    // Nothing to resolve against an empty graph; only graph-independent
    // parameters are checked
    if n == 0 {
        config.validate()?;
        info!("empty graph, nothing to compute");
        return Ok(CentralityResult::new(
            Vec::new(),
            config.accumulators.clone(),
            config.computed(),
            config.normalize,
            0.0,
        ));
    }

    let (plan, computed) = config.plan(graph)?;
    let reported = config.measures.intersection(computed);
    let normalized = config.normalize.intersection(computed);

    let start = Instant::now();
    info!(
        nodes = n,
        edges = graph.edge_count(),
        measures = %computed,
        radius = ?config.radius,
        threads = ?config.threads,
        "centrality run started"
    );

    let outcome = match config.threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()?
            .install(|| run_sources(graph, &plan, config.radius, control)),
        None => run_sources(graph, &plan, config.radius, control),
    };
    if let Err(CentralityError::Cancelled { completed, total }) = &outcome {
        warn!(completed, total, "centrality run cancelled");
    }
    let partial = outcome?;

    let mut nodes: Vec<NodeMeasures> = graph
        .nodes()
        .iter()
        .map(|info| NodeMeasures::new(info.id))
        .collect();
    for summary in partial.summaries {
        let m = &mut nodes[summary.source as usize];
        let totals = &summary.totals;
        m.reach_count = totals.reach;
        m.weighted_reach = totals.weighted_reach;
        m.accumulations = summary.accumulations;
        for measure in computed.iter() {
            let value = match measure {
                Measure::Reach => totals.reach as f64,
                Measure::Gravity => totals.gravity,
                Measure::Closeness => totals.closeness(),
                Measure::Straightness => totals.straightness,
                Measure::Betweenness => continue,
            };
            m.set(measure, value);
        }
    }
    if plan.betweenness {
        // Each unordered pair was counted once from each end
        for (i, m) in nodes.iter_mut().enumerate() {
            let raw = partial.betweenness.get(i).copied().unwrap_or(0.0);
            m.set(Measure::Betweenness, raw * 0.5);
        }
    }

    normalize(graph, &mut nodes, normalized);
    for m in &mut nodes {
        m.retain(reported);
    }

    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "centrality run finished"
    );
    Ok(CentralityResult::new(
        nodes,
        config.accumulators.clone(),
        computed,
        normalized,
        graph.total_weight(),
    ))
}

/// Lower bound on sources folded into one `Partial`. Each partial owns
/// O(n) scratch, so this caps allocations at `n / MIN_SOURCES_PER_SPLIT`.
const MIN_SOURCES_PER_SPLIT: usize = 32;

/// Per-source output kept until assembly.
struct SourceSummary {
    source: NodeIndex,
    totals: SourceTotals,
    accumulations: Vec<f64>,
}

/// One worker's share of the run: reusable scratch, a private betweenness
/// vector (allocated on first use) and the summaries of its sources.
#[derive(Default)]
struct Partial {
    scratch: Option<TraversalState>,
    betweenness: Vec<f64>,
    summaries: Vec<SourceSummary>,
}

impl Partial {
    fn run_source(&mut self, graph: &Graph, plan: &Plan, radius: Radius, source: NodeIndex) {
        let n = graph.node_count();
        let state = self
            .scratch
            .get_or_insert_with(|| TraversalState::new(n, plan.accumulators.len()));

        let mut totals = SourceTotals::default();
        let loc_s = graph.location(source);
        traverse(graph, plan, radius, state, source, |v, d| {
            let locations = if plan.straightness {
                loc_s.zip(graph.location(v))
            } else {
                None
            };
            totals.finalize(plan, v == source, d, graph.weight(v), locations);
        });

        if plan.betweenness {
            if self.betweenness.is_empty() {
                self.betweenness = vec![0.0; n];
            }
            accumulate_dependencies(state, source, graph.weight(source), &mut self.betweenness);
        }

        trace!(source = graph.node(source).id, reach = totals.reach, "source done");
        self.summaries.push(SourceSummary {
            source,
            accumulations: state.accumulation_totals(),
            totals,
        });
    }

    fn merge(mut self, other: Partial) -> Partial {
        if self.betweenness.is_empty() {
            self.betweenness = other.betweenness;
        } else {
            for (a, b) in self.betweenness.iter_mut().zip(&other.betweenness) {
                *a += b;
            }
        }
        self.summaries.extend(other.summaries);
        // Merged partials never run another source
        self.scratch = None;
        self
    }
}

fn run_sources(
    graph: &Graph,
    plan: &Plan,
    radius: Radius,
    control: &RunControl,
) -> Result<Partial, CentralityError> {
    let total = graph.node_count();
    (0..total as NodeIndex)
        .into_par_iter()
        .with_min_len(MIN_SOURCES_PER_SPLIT)
        .try_fold(Partial::default, |mut partial, source| {
            if control.cancel.is_cancelled() {
                return Err(CentralityError::Cancelled {
                    completed: control.progress.completed(),
                    total,
                });
            }
            partial.run_source(graph, plan, radius, source);
            control.progress.advance();
            Ok(partial)
        })
        .try_reduce(Partial::default, |a, b| Ok(a.merge(b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::CancellationToken;
    use proptest::prelude::*;

    const EPS: f64 = 1e-6;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    /// Letters A-D map to ids 1-4.
    fn build(edges: &[(NodeId, NodeId, f64)]) -> Graph {
        let mut g = Graph::new();
        for &(a, b, c) in edges {
            g.add_edge(a, b, c, &[]).unwrap();
        }
        g
    }

    fn run(g: &Graph, config: CentralityConfig) -> CentralityResult {
        compute_centrality(g, &config).unwrap()
    }

    fn value(result: &CentralityResult, id: NodeId, measure: Measure) -> f64 {
        result.get(id).and_then(|m| m.get(measure)).unwrap()
    }

    fn make_star(leaves: NodeId) -> Graph {
        let mut g = Graph::new();
        for leaf in 1..=leaves {
            g.add_edge(0, leaf, 1.0, &[]).unwrap();
        }
        g
    }

    #[test]
    fn test_reach_unbounded_and_radius() {
        let g = build(&[(1, 2, 1.0), (1, 3, 1.0), (2, 3, 1.0), (3, 4, 1.0)]);
        let result = run(&g, CentralityConfig::new().measure(Measure::Reach));
        for id in 1..=4 {
            assert_close(value(&result, id, Measure::Reach), 3.0);
        }

        let result = run(
            &g,
            CentralityConfig::new()
                .measure(Measure::Reach)
                .radius(Radius::Within(1.0)),
        );
        assert_close(value(&result, 1, Measure::Reach), 2.0);
        assert_close(value(&result, 2, Measure::Reach), 2.0);
        assert_close(value(&result, 3, Measure::Reach), 3.0);
        assert_close(value(&result, 4, Measure::Reach), 1.0);
    }

    #[test]
    fn test_gravity() {
        let (ln2, ln3) = (2f64.ln(), 3f64.ln());
        let g = build(&[(1, 2, ln3), (1, 3, ln2), (2, 3, ln2), (3, 4, ln3)]);
        let result = run(&g, CentralityConfig::new().measure(Measure::Gravity).beta(1.0));
        assert_close(value(&result, 1, Measure::Gravity), 1.0);
        assert_close(value(&result, 2, Measure::Gravity), 1.0);
        assert_close(value(&result, 3, Measure::Gravity), 4.0 / 3.0);
        assert_close(value(&result, 4, Measure::Gravity), 2.0 / 3.0);
    }

    #[test]
    fn test_betweenness() {
        let g = build(&[(1, 3, 1.0), (2, 3, 1.0), (3, 4, 1.0)]);
        let result = run(&g, CentralityConfig::new().measure(Measure::Betweenness));
        assert_close(value(&result, 1, Measure::Betweenness), 0.0);
        assert_close(value(&result, 2, Measure::Betweenness), 0.0);
        assert_close(value(&result, 3, Measure::Betweenness), 3.0);
        assert_close(value(&result, 4, Measure::Betweenness), 0.0);
    }

    #[test]
    fn test_closeness() {
        let g = build(&[(1, 2, 2.0), (1, 3, 1.0), (2, 3, 1.0), (3, 4, 3.0)]);
        let result = run(&g, CentralityConfig::new().measure(Measure::Closeness));
        assert_close(value(&result, 1, Measure::Closeness), 1.0 / 7.0);
        assert_close(value(&result, 2, Measure::Closeness), 1.0 / 7.0);
        assert_close(value(&result, 3, Measure::Closeness), 1.0 / 5.0);
        assert_close(value(&result, 4, Measure::Closeness), 1.0 / 11.0);
    }

    fn straightness_graph() -> Graph {
        let r2 = 2f64.sqrt();
        let mut g = build(&[(1, 2, 2.0), (1, 3, r2), (2, 3, r2), (3, 4, 1.0)]);
        g.set_location(1, -1.0, 1.0).unwrap();
        g.set_location(2, -1.0, -1.0).unwrap();
        g.set_location(3, 0.0, 0.0).unwrap();
        g.set_location(4, 1.0, 0.0).unwrap();
        g
    }

    #[test]
    fn test_straightness() {
        let g = straightness_graph();
        let result = run(&g, CentralityConfig::new().measure(Measure::Straightness));
        let (r2, r5) = (2f64.sqrt(), 5f64.sqrt());
        let ab = 2.0 + r5 / (1.0 + r2);
        assert_close(value(&result, 1, Measure::Straightness), ab);
        assert_close(value(&result, 2, Measure::Straightness), ab);
        assert_close(value(&result, 3, Measure::Straightness), 3.0);
        assert_close(value(&result, 4, Measure::Straightness), 1.0 + 2.0 * r5 / (1.0 + r2));
    }

    #[test]
    fn test_straightness_silently_disabled_without_locations() {
        let g = build(&[(1, 2, 1.0)]);
        let result = run(&g, CentralityConfig::new().measures(MeasureSet::all()));
        assert!(!result.computed().contains(Measure::Straightness));
        assert_eq!(result.get(1).unwrap().straightness(), None);
        assert!(result.get(1).unwrap().reach().is_some());
    }

    #[test]
    fn test_isolated_node() {
        let mut g = build(&[(1, 2, 1.0)]);
        g.add_node(9, 1.0).unwrap();
        let config = CentralityConfig::new()
            .measures(MeasureSet::all())
            .normalize(MeasureSet::all());
        let result = run(&g, config);
        let m = result.get(9).unwrap();
        assert_eq!(m.reach(), Some(0.0));
        assert_eq!(m.normalized(Measure::Betweenness), Some(0.0));
        assert_eq!(m.normalized(Measure::Gravity), Some(0.0));
        assert_eq!(m.closeness(), Some(0.0));
        assert_close(m.normalized(Measure::Reach).unwrap(), 1.0 / 3.0);
    }

    #[test]
    fn test_empty_graph_is_noop() {
        let g = Graph::new();
        let result = run(&g, CentralityConfig::new().measures(MeasureSet::all()));
        assert!(result.is_empty());
        assert_eq!(result.sum_weights(), 0.0);
    }

    #[test]
    fn test_empty_graph_ignores_graph_dependent_settings() {
        let g = Graph::new();
        let config = CentralityConfig::new()
            .measure(Measure::Reach)
            .accumulate("time");
        let result = run(&g, config);
        assert!(result.is_empty());
        assert_eq!(result.accumulator_fields(), ["time"]);

        // Graph-independent parameters are still checked
        let config = CentralityConfig::new().radius(Radius::Within(-1.0));
        let err = compute_centrality(&g, &config).unwrap_err();
        assert!(matches!(err, CentralityError::Config(_)));
    }

    #[test]
    fn test_normalize_without_reporting_raw() {
        let g = build(&[(1, 3, 1.0), (2, 3, 1.0), (3, 4, 1.0)]);
        let config = CentralityConfig::new()
            .measure(Measure::Reach)
            .normalize(MeasureSet::empty().with(Measure::Betweenness));
        let result = run(&g, config);
        let c = result.get(3).unwrap();
        assert_eq!(c.betweenness(), None);
        // 3 / (3 * 2)
        assert_close(c.normalized(Measure::Betweenness).unwrap(), 0.5);
        assert_eq!(c.normalized(Measure::Reach), None);
        assert_eq!(c.reach(), Some(3.0));
    }

    #[test]
    fn test_normalized_star() {
        let g = make_star(4);
        let config = CentralityConfig::new()
            .measures(MeasureSet::all())
            .normalize(MeasureSet::all());
        let result = run(&g, config);
        let hub = result.get(0).unwrap();
        assert_close(hub.normalized(Measure::Reach).unwrap(), 1.0);
        // 6 leaf pairs / (4 * 3)
        assert_close(hub.normalized(Measure::Betweenness).unwrap(), 0.5);
        // closeness 1/4 scaled by weighted reach 4
        assert_close(hub.normalized(Measure::Closeness).unwrap(), 1.0);
        assert_close(hub.normalized(Measure::Gravity).unwrap(), (-1f64).exp());
    }

    #[test]
    fn test_normalized_straightness() {
        let g = straightness_graph();
        let config = CentralityConfig::new()
            .measure(Measure::Reach)
            .normalize(MeasureSet::empty().with(Measure::Straightness));
        let result = run(&g, config);
        let (r2, r5) = (2f64.sqrt(), 5f64.sqrt());
        // Every node reaches the other three, each of weight 1
        let ab = (2.0 + r5 / (1.0 + r2)) / 3.0;
        assert_close(result.get(1).unwrap().normalized(Measure::Straightness).unwrap(), ab);
        assert_close(result.get(2).unwrap().normalized(Measure::Straightness).unwrap(), ab);
        assert_close(result.get(3).unwrap().normalized(Measure::Straightness).unwrap(), 1.0);
        assert_close(
            result.get(4).unwrap().normalized(Measure::Straightness).unwrap(),
            (1.0 + 2.0 * r5 / (1.0 + r2)) / 3.0,
        );
        assert_eq!(result.get(3).unwrap().straightness(), None);
    }

    #[test]
    fn test_merged_partials_release_scratch() {
        let g = make_star(3);
        let plan = CentralityConfig::new()
            .measure(Measure::Betweenness)
            .plan(&g)
            .unwrap()
            .0;
        let mut a = Partial::default();
        let mut b = Partial::default();
        a.run_source(&g, &plan, Radius::Unbounded, 0);
        b.run_source(&g, &plan, Radius::Unbounded, 1);
        assert!(a.scratch.is_some() && b.scratch.is_some());

        let merged = a.merge(b);
        assert!(merged.scratch.is_none());
        assert_eq!(merged.summaries.len(), 2);
        // Source 1 (a leaf) routes through the hub to the other two leaves
        assert_eq!(merged.betweenness[0], 2.0);
    }

    #[test]
    fn test_accumulator_totals() {
        let mut g = Graph::with_accumulators(["time", "length"]).unwrap();
        g.add_edge(1, 2, 1.0, &[2.0, 100.0]).unwrap();
        g.add_edge(2, 3, 1.0, &[3.0, 200.0]).unwrap();
        let config = CentralityConfig::new()
            .measure(Measure::Reach)
            .accumulate("length")
            .accumulate("time");
        let result = run(&g, config);
        assert_eq!(result.accumulator_fields(), ["length", "time"]);
        // From 1: node 2 totals (100, 2), node 3 totals (300, 5)
        assert_close(result.accumulation(1, "length").unwrap(), 400.0);
        assert_close(result.accumulation(1, "time").unwrap(), 7.0);
        // From 2: both neighbors directly
        assert_close(result.accumulation(2, "length").unwrap(), 300.0);
        assert_eq!(result.accumulation(2, "speed"), None);

        let config = CentralityConfig::new()
            .accumulate("length")
            .radius(Radius::Within(1.0));
        let result = run(&g, config);
        assert_close(result.accumulation(1, "length").unwrap(), 100.0);
    }

    #[test]
    fn test_unknown_accumulator_rejected() {
        let g = build(&[(1, 2, 1.0)]);
        let err = compute_centrality(&g, &CentralityConfig::new().accumulate("time")).unwrap_err();
        assert!(matches!(err, CentralityError::Config(_)));
    }

    #[test]
    fn test_dedicated_pool_matches_global() {
        let g = make_grid(6);
        let config = CentralityConfig::new().measures(MeasureSet::all());
        let global = run(&g, config.clone());
        let single = run(&g, config.threads(1));
        for (a, b) in global.iter().zip(single.iter()) {
            for measure in Measure::ALL {
                match (a.get(measure), b.get(measure)) {
                    (Some(x), Some(y)) => assert_close(x, y),
                    (x, y) => assert_eq!(x, y),
                }
            }
        }
    }

    #[test]
    fn test_cancelled_before_start() {
        let g = make_star(10);
        let control = RunControl::new();
        let token: CancellationToken = control.cancel.clone();
        token.cancel();
        let config = CentralityConfig::new().measure(Measure::Reach);
        let err = compute_centrality_with(&g, &config, &control).unwrap_err();
        assert!(matches!(err, CentralityError::Cancelled { total: 11, .. }));
    }

    #[test]
    fn test_progress_reaches_total() {
        let g = make_star(5);
        let control = RunControl::new();
        let config = CentralityConfig::new().measure(Measure::Reach);
        compute_centrality_with(&g, &config, &control).unwrap();
        assert_eq!(control.progress.completed(), 6);
        assert_eq!(control.progress.total(), 6);
    }

    fn make_grid(side: u64) -> Graph {
        let mut g = Graph::new();
        for r in 0..side {
            for c in 0..side {
                let id = r * side + c;
                if c + 1 < side {
                    g.add_edge(id, id + 1, 1.0, &[]).unwrap();
                }
                if r + 1 < side {
                    g.add_edge(id, id + side, 1.0, &[]).unwrap();
                }
                g.set_location(id, c as f64, r as f64).unwrap();
            }
        }
        g
    }

    fn arb_graph() -> impl Strategy<Value = Graph> {
        prop::collection::vec((0u64..12, 0u64..12, 1u32..5), 1..40).prop_map(|edges| {
            let mut g = Graph::new();
            for (a, b, c) in edges {
                if a != b {
                    g.add_edge(a, b, c as f64, &[]).unwrap();
                }
            }
            g
        })
    }

    proptest! {
        #[test]
        fn prop_rerun_is_idempotent(g in arb_graph()) {
            let config = CentralityConfig::new()
                .measures(MeasureSet::all())
                .normalize(MeasureSet::all());
            let first = run(&g, config.clone());
            let second = run(&g, config);
            prop_assert_eq!(first.len(), second.len());
            for (a, b) in first.iter().zip(second.iter()) {
                for measure in Measure::ALL {
                    match (a.get(measure), b.get(measure)) {
                        (Some(x), Some(y)) => prop_assert!((x - y).abs() <= EPS),
                        (x, y) => prop_assert_eq!(x, y),
                    }
                }
            }
        }

        #[test]
        fn prop_betweenness_non_negative(g in arb_graph()) {
            let result = run(&g, CentralityConfig::new().measure(Measure::Betweenness));
            for m in result.iter() {
                prop_assert!(m.betweenness().unwrap() >= 0.0);
            }
        }

        #[test]
        fn prop_single_thread_matches_parallel(g in arb_graph()) {
            let config = CentralityConfig::new()
                .measures(MeasureSet::all())
                .radius(Radius::Within(6.0));
            let parallel = run(&g, config.clone());
            let single = run(&g, config.threads(1));
            for (a, b) in parallel.iter().zip(single.iter()) {
                prop_assert_eq!(a.reach_count, b.reach_count);
                prop_assert!((a.betweenness().unwrap() - b.betweenness().unwrap()).abs() <= EPS);
                prop_assert!((a.closeness().unwrap() - b.closeness().unwrap()).abs() <= EPS);
            }
        }
    }
}
