use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::graph::{Location, NodeId};

/// The five built-in centrality measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Measure {
    Reach,
    Gravity,
    Betweenness,
    Closeness,
    Straightness,
}

impl Measure {
    pub const COUNT: usize = 5;

    pub const ALL: [Measure; Measure::COUNT] = [
        Measure::Reach,
        Measure::Gravity,
        Measure::Betweenness,
        Measure::Closeness,
        Measure::Straightness,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Measure::Reach => "reach",
            Measure::Gravity => "gravity",
            Measure::Betweenness => "betweenness",
            Measure::Closeness => "closeness",
            Measure::Straightness => "straightness",
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Measure {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reach" => Ok(Measure::Reach),
            "gravity" | "gravity_type_index" => Ok(Measure::Gravity),
            "betweenness" => Ok(Measure::Betweenness),
            "closeness" => Ok(Measure::Closeness),
            "straightness" => Ok(Measure::Straightness),
            _ => Err(ConfigError::UnknownMeasure(s.to_string())),
        }
    }
}

/// A set of measures, stored as a bitmask over [`Measure::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MeasureSet(u8);

impl MeasureSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self((1 << Measure::COUNT) - 1)
    }

    pub fn insert(&mut self, measure: Measure) {
        self.0 |= 1 << measure.index();
    }

    pub fn remove(&mut self, measure: Measure) {
        self.0 &= !(1 << measure.index());
    }

    pub fn with(mut self, measure: Measure) -> Self {
        self.insert(measure);
        self
    }

    pub fn contains(self, measure: Measure) -> bool {
        self.0 & (1 << measure.index()) != 0
    }

    pub fn union(self, other: MeasureSet) -> Self {
        Self(self.0 | other.0)
    }

    pub fn intersection(self, other: MeasureSet) -> Self {
        Self(self.0 & other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Measure> {
        Measure::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

impl fmt::Display for MeasureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, m) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(m.name())?;
        }
        Ok(())
    }
}

impl FromIterator<Measure> for MeasureSet {
    fn from_iter<I: IntoIterator<Item = Measure>>(iter: I) -> Self {
        let mut set = MeasureSet::empty();
        for m in iter {
            set.insert(m);
        }
        set
    }
}

impl FromStr for MeasureSet {
    type Err = ConfigError;

    /// Parse a comma- or semicolon-separated list. `all` selects every
    /// measure; an empty string is the empty set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(MeasureSet::all());
        }
        s.split([',', ';'])
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Measure::from_str)
            .collect()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for MeasureSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for MeasureSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let measures = Vec::<Measure>::deserialize(deserializer)?;
        Ok(measures.into_iter().collect())
    }
}

/// What a single source's traversal must track, resolved once per run.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub gravity: bool,
    pub betweenness: bool,
    pub closeness: bool,
    pub straightness: bool,
    pub beta: f64,
    /// Graph accumulator ids to total, in requested order.
    pub accumulators: Vec<usize>,
}

impl Plan {
    pub fn has_accumulators(&self) -> bool {
        !self.accumulators.is_empty()
    }
}

/// Running sums for one source, fed as nodes are finalized.
///
/// Reach and weighted reach exclude the source itself explicitly; gravity,
/// closeness and straightness only count nodes at positive distance.
#[derive(Debug, Clone, Default)]
pub(crate) struct SourceTotals {
    pub reach: usize,
    pub weighted_reach: f64,
    pub gravity: f64,
    pub distance_sum: f64,
    pub straightness: f64,
}

impl SourceTotals {
    /// Record a finalized node `v` at distance `d` from the source.
    pub fn finalize(
        &mut self,
        plan: &Plan,
        is_source: bool,
        d: f64,
        weight_v: f64,
        locations: Option<(Location, Location)>,
    ) {
        if is_source {
            return;
        }
        self.reach += 1;
        self.weighted_reach += weight_v;

        if d > 0.0 {
            if plan.gravity {
                self.gravity += weight_v / (d * plan.beta).exp();
            }
            if plan.closeness {
                self.distance_sum += weight_v * d;
            }
            if let (true, Some((loc_s, loc_v))) = (plan.straightness, locations) {
                self.straightness += weight_v * loc_s.distance(&loc_v) / d;
            }
        }
    }

    pub fn closeness(&self) -> f64 {
        if self.distance_sum > 0.0 {
            1.0 / self.distance_sum
        } else {
            0.0
        }
    }
}

/// Per-node output: raw and normalized measure values, reach bookkeeping
/// used by normalization, and accumulator totals.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeMeasures {
    pub id: NodeId,
    /// Number of nodes reached within the radius, excluding this node.
    pub reach_count: usize,
    /// Summed weight of the nodes counted in `reach_count`.
    pub weighted_reach: f64,
    values: [Option<f64>; Measure::COUNT],
    normalized: [Option<f64>; Measure::COUNT],
    /// One total per requested accumulator field, in request order.
    pub accumulations: Vec<f64>,
}

impl NodeMeasures {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            reach_count: 0,
            weighted_reach: 0.0,
            values: [None; Measure::COUNT],
            normalized: [None; Measure::COUNT],
            accumulations: Vec::new(),
        }
    }

    /// Raw value of `measure`, if it was requested.
    pub fn get(&self, measure: Measure) -> Option<f64> {
        self.values[measure.index()]
    }

    /// Normalized value of `measure`, if normalization was requested.
    pub fn normalized(&self, measure: Measure) -> Option<f64> {
        self.normalized[measure.index()]
    }

    pub fn reach(&self) -> Option<f64> {
        self.get(Measure::Reach)
    }

    pub fn gravity(&self) -> Option<f64> {
        self.get(Measure::Gravity)
    }

    pub fn betweenness(&self) -> Option<f64> {
        self.get(Measure::Betweenness)
    }

    pub fn closeness(&self) -> Option<f64> {
        self.get(Measure::Closeness)
    }

    pub fn straightness(&self) -> Option<f64> {
        self.get(Measure::Straightness)
    }

    pub(crate) fn set(&mut self, measure: Measure, value: f64) {
        self.values[measure.index()] = Some(value);
    }

    pub(crate) fn set_normalized(&mut self, measure: Measure, value: f64) {
        self.normalized[measure.index()] = Some(value);
    }

    /// Drop raw values that were only computed to feed normalization.
    pub(crate) fn retain(&mut self, reported: MeasureSet) {
        for m in Measure::ALL {
            if !reported.contains(m) {
                self.values[m.index()] = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_all(beta: f64) -> Plan {
        Plan {
            gravity: true,
            betweenness: false,
            closeness: true,
            straightness: true,
            beta,
            accumulators: Vec::new(),
        }
    }

    #[test]
    fn test_measure_names_roundtrip() {
        for m in Measure::ALL {
            assert_eq!(m.name().parse::<Measure>().unwrap(), m);
        }
        assert_eq!("Gravity_Type_Index".parse::<Measure>().unwrap(), Measure::Gravity);
        assert_eq!(
            "pagerank".parse::<Measure>(),
            Err(ConfigError::UnknownMeasure("pagerank".into()))
        );
    }

    #[test]
    fn test_measure_set_parse() {
        let set: MeasureSet = "reach; closeness,betweenness".parse().unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.contains(Measure::Reach));
        assert!(set.contains(Measure::Betweenness));
        assert!(!set.contains(Measure::Gravity));
        assert_eq!("all".parse::<MeasureSet>().unwrap(), MeasureSet::all());
        assert!("".parse::<MeasureSet>().unwrap().is_empty());
        assert_eq!(set.to_string(), "reach,betweenness,closeness");
    }

    #[test]
    fn test_measure_set_iter_order() {
        let set = MeasureSet::empty()
            .with(Measure::Straightness)
            .with(Measure::Reach);
        let v: Vec<Measure> = set.iter().collect();
        assert_eq!(v, vec![Measure::Reach, Measure::Straightness]);
    }

    #[test]
    fn test_source_excluded_from_totals() {
        let plan = plan_all(1.0);
        let mut totals = SourceTotals::default();
        totals.finalize(&plan, true, 0.0, 5.0, None);
        assert_eq!(totals.reach, 0);
        assert_eq!(totals.weighted_reach, 0.0);
    }

    #[test]
    fn test_zero_distance_counts_for_reach_only() {
        let plan = plan_all(1.0);
        let mut totals = SourceTotals::default();
        totals.finalize(&plan, false, 0.0, 2.0, None);
        assert_eq!(totals.reach, 1);
        assert_eq!(totals.weighted_reach, 2.0);
        assert_eq!(totals.gravity, 0.0);
        assert_eq!(totals.distance_sum, 0.0);
        assert_eq!(totals.closeness(), 0.0);
    }

    #[test]
    fn test_running_sums() {
        let plan = plan_all(2.0);
        let mut totals = SourceTotals::default();
        let s = Location::new(0.0, 0.0);
        totals.finalize(&plan, false, 1.0, 3.0, Some((s, Location::new(0.0, 1.0))));
        totals.finalize(&plan, false, 2.0, 1.0, Some((s, Location::new(1.0, 0.0))));

        assert!((totals.gravity - (3.0 / 2f64.exp() + 1.0 / 4f64.exp())).abs() < 1e-12);
        assert_eq!(totals.distance_sum, 5.0);
        assert_eq!(totals.closeness(), 0.2);
        assert!((totals.straightness - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_node_measures_retain() {
        let mut m = NodeMeasures::new(7);
        m.set(Measure::Reach, 3.0);
        m.set(Measure::Gravity, 1.5);
        m.set_normalized(Measure::Gravity, 0.5);
        m.retain(MeasureSet::empty().with(Measure::Reach));
        assert_eq!(m.reach(), Some(3.0));
        assert_eq!(m.gravity(), None);
        assert_eq!(m.normalized(Measure::Gravity), Some(0.5));
    }
}
