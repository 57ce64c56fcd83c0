use crate::config::{eq_tol, lt_tol, Radius};
use crate::graph::{Graph, NodeId, NodeIndex};
use crate::measures::Plan;
use crate::queue::IndexedMinHeap;

/// Per-source scratch space, owned by one worker and reused across the
/// sources it processes. Only entries listed in `reached` are dirty, so
/// resetting costs O(reached), not O(n).
#[derive(Debug, Clone)]
pub(crate) struct TraversalState {
    /// Best known distance; `INFINITY` means not yet reached.
    pub dist: Vec<f64>,
    finalized: Vec<bool>,
    reached: Vec<NodeIndex>,
    queue: IndexedMinHeap,
    /// Nodes in finalization order.
    pub stack: Vec<NodeIndex>,
    pub sigma: Vec<f64>,
    pub preds: Vec<Vec<NodeIndex>>,
    pub delta: Vec<f64>,
    /// Cumulative accumulator totals along the current best path,
    /// `k` values per node.
    accum: Vec<f64>,
    accum_set: Vec<bool>,
    accum_nodes: Vec<NodeIndex>,
    k: usize,
}

impl TraversalState {
    pub fn new(node_count: usize, accumulators: usize) -> Self {
        Self {
            dist: vec![f64::INFINITY; node_count],
            finalized: vec![false; node_count],
            reached: Vec::new(),
            queue: IndexedMinHeap::with_capacity(node_count),
            stack: Vec::new(),
            sigma: vec![0.0; node_count],
            preds: vec![Vec::new(); node_count],
            delta: vec![0.0; node_count],
            accum: vec![0.0; node_count * accumulators],
            accum_set: vec![false; if accumulators > 0 { node_count } else { 0 }],
            accum_nodes: Vec::new(),
            k: accumulators,
        }
    }

    fn reset(&mut self) {
        for &v in &self.reached {
            let v = v as usize;
            self.dist[v] = f64::INFINITY;
            self.finalized[v] = false;
            self.sigma[v] = 0.0;
            self.preds[v].clear();
            self.delta[v] = 0.0;
        }
        for &v in &self.accum_nodes {
            let start = v as usize * self.k;
            self.accum[start..start + self.k].fill(0.0);
            self.accum_set[v as usize] = false;
        }
        self.reached.clear();
        self.accum_nodes.clear();
        self.stack.clear();
        self.queue.clear();
    }

    fn reach(&mut self, w: NodeIndex, d: f64) {
        if self.dist[w as usize].is_infinite() {
            self.reached.push(w);
        }
        self.dist[w as usize] = d;
    }

    /// Overwrite `w`'s cumulative totals with `v`'s plus the arc's
    /// contributions. Only the most recent relaxing predecessor is kept.
    fn propagate(&mut self, v: NodeIndex, w: NodeIndex, contributions: &[f64], fields: &[usize]) {
        if self.k == 0 {
            return;
        }
        let (vs, ws) = (v as usize * self.k, w as usize * self.k);
        for (j, &field) in fields.iter().enumerate() {
            self.accum[ws + j] = self.accum[vs + j] + contributions[field];
        }
        self.mark_accumulated(w);
    }

    fn mark_accumulated(&mut self, v: NodeIndex) {
        if !self.accum_set[v as usize] {
            self.accum_set[v as usize] = true;
            self.accum_nodes.push(v);
        }
    }

    /// Sum of the cumulative totals over every node enqueued for the last
    /// source (the source itself contributes zeros).
    pub fn accumulation_totals(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.k];
        for &v in &self.accum_nodes {
            let start = v as usize * self.k;
            for (t, a) in totals.iter_mut().zip(&self.accum[start..start + self.k]) {
                *t += a;
            }
        }
        totals
    }
}

/// Radius-bounded Dijkstra from `source`, recording Brandes forward state
/// (sigma, predecessors, finalization stack) when betweenness is planned and
/// propagating accumulator totals when accumulators are planned.
///
/// `on_finalize(v, d)` is called once per node in non-decreasing distance
/// order, starting with the source at distance 0.
///
/// Nodes beyond the radius get a distance entry but are never enqueued, so
/// they are never finalized.
pub(crate) fn traverse<F>(
    graph: &Graph,
    plan: &Plan,
    radius: Radius,
    state: &mut TraversalState,
    source: NodeIndex,
    mut on_finalize: F,
) where
    F: FnMut(NodeIndex, f64),
{
    state.reset();
    state.reach(source, 0.0);
    state.sigma[source as usize] = 1.0;
    if plan.has_accumulators() {
        state.mark_accumulated(source);
    }
    state.queue.push_or_decrease(source, 0.0);

    while let Some((d_sv, v)) = state.queue.pop() {
        state.finalized[v as usize] = true;
        state.stack.push(v);
        on_finalize(v, d_sv);

        for edge in graph.neighbors(v) {
            let w = edge.target;
            let d_sw = d_sv + edge.cost;
            let d_w = state.dist[w as usize];
            let mut refresh = false;

            if d_w.is_infinite() {
                // First path found to w
                if radius.contains(d_sw) {
                    state.queue.push_or_decrease(w, d_sw);
                    if plan.has_accumulators() {
                        state.propagate(v, w, graph.contributions(edge), &plan.accumulators);
                    }
                }
                state.reach(w, d_sw);
                refresh = true;
            } else if lt_tol(d_sw, d_w) {
                // Strictly shorter path to w; a queued entry is moved in place
                if radius.contains(d_sw) && !state.finalized[w as usize] {
                    state.queue.push_or_decrease(w, d_sw);
                    if plan.has_accumulators() {
                        state.propagate(v, w, graph.contributions(edge), &plan.accumulators);
                    }
                }
                state.reach(w, d_sw);
                refresh = true;
            }

            if plan.betweenness && w != source {
                let wi = w as usize;
                if refresh {
                    state.sigma[wi] = 0.0;
                    state.preds[wi].clear();
                }
                if eq_tol(d_sw, state.dist[wi]) {
                    state.sigma[wi] += state.sigma[v as usize];
                    state.preds[wi].push(v);
                    state.delta[v as usize] = 0.0;
                }
            }
        }
    }
}

/// Shortest network distances from `source` to every node within `radius`,
/// in finalization order (the source first, at distance 0).
///
/// Returns `None` if `source` is not in the graph.
pub fn shortest_distances(
    graph: &Graph,
    source: NodeId,
    radius: Radius,
) -> Option<Vec<(NodeId, f64)>> {
    let s = graph.index_of(source)?;
    let plan = Plan {
        gravity: false,
        betweenness: false,
        closeness: false,
        straightness: false,
        beta: 1.0,
        accumulators: Vec::new(),
    };
    let mut state = TraversalState::new(graph.node_count(), 0);
    let mut out = Vec::new();
    traverse(graph, &plan, radius, &mut state, s, |v, d| {
        out.push((graph.node(v).id, d));
    });
    Some(out)
}
