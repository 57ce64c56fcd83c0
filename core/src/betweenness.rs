//! Brandes dependency accumulation, run after a source's traversal.

use crate::graph::NodeIndex;
use crate::traversal::TraversalState;

/// Pop the finalization stack in reverse distance order, pushing each
/// node's dependency back to its predecessors, and add the dependency of
/// every non-source node, scaled by the source weight, into `betweenness`.
///
/// Consumes the stack. `betweenness` is indexed by node and summed over all
/// sources; each unordered pair is counted from both ends.
pub(crate) fn accumulate_dependencies(
    state: &mut TraversalState,
    source: NodeIndex,
    source_weight: f64,
    betweenness: &mut [f64],
) {
    let TraversalState {
        stack,
        sigma,
        preds,
        delta,
        ..
    } = state;

    while let Some(w) = stack.pop() {
        let w = w as usize;
        let delta_w = delta[w];
        let sigma_w = sigma[w];
        for &v in &preds[w] {
            let v = v as usize;
            delta[v] += sigma[v] / sigma_w * (1.0 + delta_w);
        }
        if w != source as usize {
            betweenness[w] += delta_w * source_weight;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Radius;
    use crate::graph::Graph;
    use crate::measures::Plan;
    use crate::traversal::traverse;

    fn brandes_plan() -> Plan {
        Plan {
            gravity: false,
            betweenness: true,
            closeness: false,
            straightness: false,
            beta: 1.0,
            accumulators: Vec::new(),
        }
    }

    /// Raw (unhalved) betweenness summed over every source.
    fn raw_betweenness(g: &Graph, radius: Radius) -> Vec<f64> {
        let plan = brandes_plan();
        let mut state = TraversalState::new(g.node_count(), 0);
        let mut out = vec![0.0; g.node_count()];
        for s in 0..g.node_count() as NodeIndex {
            traverse(g, &plan, radius, &mut state, s, |_, _| {});
            accumulate_dependencies(&mut state, s, g.weight(s), &mut out);
        }
        out
    }

    #[test]
    fn test_path_graph_center() {
        // A - B - C: B lies on the only A-C path, counted from both ends
        let mut g = Graph::new();
        g.add_edge(1, 2, 1.0, &[]).unwrap();
        g.add_edge(2, 3, 1.0, &[]).unwrap();
        let b = raw_betweenness(&g, Radius::Unbounded);
        assert_eq!(b, vec![0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_tied_paths_split_dependency() {
        // Square 0-1-3-2: each opposite pair has two shortest routes, so
        // every corner carries half of the pair it sits between
        let mut g = Graph::new();
        g.add_edge(0, 1, 1.0, &[]).unwrap();
        g.add_edge(0, 2, 1.0, &[]).unwrap();
        g.add_edge(1, 3, 1.0, &[]).unwrap();
        g.add_edge(2, 3, 1.0, &[]).unwrap();
        let b = raw_betweenness(&g, Radius::Unbounded);
        for x in b {
            assert!((x - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_pendant_off_square() {
        // Same square with a pendant 4 off corner 3: pair (0,4) routes via
        // 1 or 2 with equal share, and every pair with 4 passes through 3
        let mut g = Graph::new();
        g.add_edge(0, 1, 1.0, &[]).unwrap();
        g.add_edge(0, 2, 1.0, &[]).unwrap();
        g.add_edge(1, 3, 1.0, &[]).unwrap();
        g.add_edge(2, 3, 1.0, &[]).unwrap();
        g.add_edge(3, 4, 1.0, &[]).unwrap();
        let b = raw_betweenness(&g, Radius::Unbounded);
        // Corner 3: half of (1,2), plus (0,4), (1,4), (2,4), both ends
        assert!((b[3] - 7.0).abs() < 1e-9);
        // Corner 1: half of (0,3), (0,4)
        assert!((b[1] - 2.0).abs() < 1e-9);
        assert!((b[0] - 1.0).abs() < 1e-9);
        assert_eq!(b[4], 0.0);
    }

    #[test]
    fn test_source_weight_scales_dependency() {
        let mut g = Graph::new();
        g.add_node(1, 3.0).unwrap();
        g.add_edge(1, 2, 1.0, &[]).unwrap();
        g.add_edge(2, 3, 1.0, &[]).unwrap();
        let b = raw_betweenness(&g, Radius::Unbounded);
        // From 1 (weight 3) and from 3 (weight 1)
        assert_eq!(b[1], 4.0);
    }

    #[test]
    fn test_radius_excludes_far_pairs() {
        let mut g = Graph::new();
        g.add_edge(1, 2, 1.0, &[]).unwrap();
        g.add_edge(2, 3, 1.0, &[]).unwrap();
        let b = raw_betweenness(&g, Radius::Within(1.5));
        assert_eq!(b, vec![0.0; 3]);
    }

    #[test]
    fn test_star_hub() {
        // Hub 0 with 4 leaves: every leaf pair passes through the hub
        let mut g = Graph::new();
        for leaf in 1..=4 {
            g.add_edge(0, leaf, 1.0, &[]).unwrap();
        }
        let b = raw_betweenness(&g, Radius::Unbounded);
        // 6 unordered leaf pairs, counted from both ends
        assert_eq!(b[0], 12.0);
        assert!(b[1..].iter().all(|&x| x == 0.0));
    }
}
