use crate::graph::Graph;
use crate::measures::{Measure, MeasureSet, NodeMeasures};

/// `num / den`, or 0.0 when the quotient is undefined or not finite.
fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        return 0.0;
    }
    let r = num / den;
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

/// Normalized value of one measure at one node.
///
/// `weight` is the node's own weight, `sum_weights` the total over the
/// graph. Every undefined case degrades to 0.0.
pub fn normalized_value(
    measure: Measure,
    raw: f64,
    m: &NodeMeasures,
    weight: f64,
    sum_weights: f64,
) -> f64 {
    let wr = m.weighted_reach;
    match measure {
        Measure::Reach => ratio(m.reach_count as f64 + weight, sum_weights),
        Measure::Gravity => ratio(raw, wr),
        Measure::Betweenness => {
            if m.reach_count <= 1 {
                0.0
            } else {
                ratio(raw, wr * (m.reach_count - 1) as f64)
            }
        }
        Measure::Closeness => {
            let v = raw * wr;
            if v.is_finite() {
                v
            } else {
                0.0
            }
        }
        Measure::Straightness => ratio(raw, wr),
    }
}

/// Fill in normalized values for every measure in `measures`. Raw values
/// must already be set on each node.
pub(crate) fn normalize(graph: &Graph, nodes: &mut [NodeMeasures], measures: MeasureSet) {
    if measures.is_empty() {
        return;
    }
    let sum_weights = graph.total_weight();
    for (info, m) in graph.nodes().iter().zip(nodes.iter_mut()) {
        for measure in measures.iter() {
            let raw = m.get(measure).unwrap_or(0.0);
            let value = normalized_value(measure, raw, m, info.weight, sum_weights);
            m.set_normalized(measure, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(reach_count: usize, weighted_reach: f64) -> NodeMeasures {
        let mut m = NodeMeasures::new(1);
        m.reach_count = reach_count;
        m.weighted_reach = weighted_reach;
        m
    }

    #[test]
    fn test_reach_includes_own_weight() {
        let m = node(2, 2.0);
        assert_eq!(normalized_value(Measure::Reach, 2.0, &m, 1.0, 3.0), 1.0);
        assert_eq!(normalized_value(Measure::Reach, 0.0, &node(0, 0.0), 1.0, 4.0), 0.25);
    }

    #[test]
    fn test_zero_denominators_degrade_to_zero() {
        let isolated = node(0, 0.0);
        for measure in Measure::ALL {
            assert_eq!(normalized_value(measure, 0.0, &isolated, 1.0, 0.0), 0.0);
        }
        // Weighted reach of zero with a positive raw value
        assert_eq!(normalized_value(Measure::Gravity, 2.0, &node(3, 0.0), 0.0, 1.0), 0.0);
        assert_eq!(normalized_value(Measure::Straightness, 2.0, &node(3, 0.0), 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_betweenness_needs_two_reached() {
        assert_eq!(normalized_value(Measure::Betweenness, 5.0, &node(1, 1.0), 1.0, 2.0), 0.0);
        assert_eq!(normalized_value(Measure::Betweenness, 3.0, &node(3, 3.0), 1.0, 4.0), 0.5);
    }

    #[test]
    fn test_closeness_scales_by_weighted_reach() {
        assert_eq!(normalized_value(Measure::Closeness, 0.25, &node(2, 2.0), 1.0, 3.0), 0.5);
    }

    #[test]
    fn test_normalize_only_requested() {
        let mut g = Graph::new();
        g.add_edge(1, 2, 1.0, &[]).unwrap();
        let mut nodes: Vec<NodeMeasures> = g.nodes().iter().map(|n| node_for(n.id)).collect();
        normalize(&g, &mut nodes, MeasureSet::empty().with(Measure::Reach));
        for m in &nodes {
            assert_eq!(m.normalized(Measure::Reach), Some(1.0));
            assert_eq!(m.normalized(Measure::Gravity), None);
        }
    }

    fn node_for(id: u64) -> NodeMeasures {
        let mut m = NodeMeasures::new(id);
        m.reach_count = 1;
        m.weighted_reach = 1.0;
        m.set(Measure::Reach, 1.0);
        m
    }
}
