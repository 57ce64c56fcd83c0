use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use centrality_core::{
    compute_centrality_with, shortest_distances, AdjacencyRow, CentralityConfig, CentralityResult,
    Graph, Measure, MeasureSet, NodeId, Radius, RunControl,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Spatial-network centrality benchmark and runner
#[derive(Parser)]
#[command(name = "centrality-bench", version)]
#[command(about = "Time the centrality engine on synthetic networks, or run it on a JSON network")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Generate synthetic spatial networks and time the engine (default)
    Generate(GenerateArgs),

    /// Compute centrality for a JSON network and print JSON results
    Run(RunArgs),
}

#[derive(Args, Clone)]
struct EngineArgs {
    /// Measures to compute: comma-separated names, or "all"
    #[arg(long, default_value = "all")]
    measures: MeasureSet,

    /// Network radius; omit (or pass "inf") for no cutoff
    #[arg(long)]
    radius: Option<f64>,

    /// Gravity decay exponent
    #[arg(long, default_value_t = centrality_core::DEFAULT_BETA)]
    beta: f64,

    /// Measures to also report normalized
    #[arg(long, default_value = "")]
    normalize: MeasureSet,

    /// Worker threads (defaults to one per core)
    #[arg(long, env = "CENTRALITY_THREADS")]
    threads: Option<usize>,
}

impl Default for EngineArgs {
    fn default() -> Self {
        Self {
            measures: MeasureSet::all(),
            radius: None,
            beta: centrality_core::DEFAULT_BETA,
            normalize: MeasureSet::empty(),
            threads: None,
        }
    }
}

impl EngineArgs {
    fn config(&self) -> CentralityConfig {
        let mut config = CentralityConfig::new()
            .measures(self.measures)
            .radius(to_radius(self.radius))
            .beta(self.beta)
            .normalize(self.normalize);
        config.threads = self.threads;
        config
    }
}

#[derive(Args)]
struct GenerateArgs {
    /// Network topology
    #[arg(value_enum, default_value_t = Topology::All)]
    topology: Topology,

    /// Target node count per network
    #[arg(short, long, default_value_t = 2_000)]
    nodes: u64,

    /// Also total the generated "time" accumulator
    #[arg(long)]
    accumulate: bool,

    #[command(flatten)]
    engine: EngineArgs,
}

impl Default for GenerateArgs {
    fn default() -> Self {
        Self {
            topology: Topology::All,
            nodes: 2_000,
            accumulate: false,
            engine: EngineArgs::default(),
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// Network file (JSON: accumulators, nodes, edges)
    #[arg(short, long)]
    input: PathBuf,

    /// Write results here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Accumulator fields to total
    #[arg(long, value_delimiter = ',')]
    accumulate: Vec<String>,

    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Topology {
    /// Every generator below
    All,
    /// Jittered street grid
    Grid,
    /// Ring of towns with occasional long links (Watts-Strogatz)
    SmallWorld,
    /// Random geometric graph: nearby points linked
    Geometric,
    /// Two dense districts joined by a single road
    Barbell,
    /// Diffusion-limited aggregation (organic branching)
    Dla,
}

fn main() -> Result<()> {
    // Logs go to stderr so JSON output on stdout stays clean
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("centrality_core=info,centrality_bench=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or_else(|| Command::Generate(GenerateArgs::default())) {
        Command::Generate(args) => generate(args),
        Command::Run(args) => run(args),
    }
}

fn to_radius(radius: Option<f64>) -> Radius {
    match radius {
        Some(r) if r.is_finite() => Radius::Within(r),
        _ => Radius::Unbounded,
    }
}

// ---------------------------------------------------------------------------
// run: JSON in, JSON out
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct NetworkFile {
    #[serde(default)]
    accumulators: Vec<String>,
    #[serde(default)]
    nodes: Vec<NodeRecord>,
    #[serde(default)]
    edges: Vec<AdjacencyRow>,
}

#[derive(Deserialize)]
struct NodeRecord {
    id: NodeId,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
}

fn default_weight() -> f64 {
    centrality_core::DEFAULT_WEIGHT
}

fn load_network(path: &Path) -> Result<Graph> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let network: NetworkFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;

    let mut graph = Graph::with_accumulators(&network.accumulators)?;
    graph.reserve(network.nodes.len(), network.edges.len());
    for node in &network.nodes {
        graph.add_node(node.id, node.weight)?;
        match (node.x, node.y) {
            (Some(x), Some(y)) => graph.set_location(node.id, x, y)?,
            (None, None) => {}
            _ => bail!("node {} has only one coordinate", node.id),
        }
    }
    let summary = graph.load_adjacency(network.edges)?;
    info!(
        nodes = graph.node_count(),
        edges = summary.edges_added,
        rows = summary.rows,
        "network loaded"
    );
    Ok(graph)
}

fn run(args: RunArgs) -> Result<()> {
    let graph = load_network(&args.input)?;
    let mut config = args.engine.config();
    config.accumulators = args.accumulate;

    let result = run_with_progress(&graph, &config)?;
    if config.measures.contains(Measure::Straightness)
        && !result.computed().contains(Measure::Straightness)
    {
        warn!("straightness skipped: some nodes have no location");
    }

    let doc = json!({
        "sum_weights": result.sum_weights(),
        "nodes": result.iter().map(|m| node_json(&result, m)).collect::<Vec<_>>(),
    });
    match args.output {
        Some(path) => {
            let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            let mut out = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut out, &doc)?;
            out.flush()?;
        }
        None => {
            let mut out = io::stdout().lock();
            serde_json::to_writer_pretty(&mut out, &doc)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Flat per-node record: raw values under the measure name, normalized
/// values under `<name>_norm`, then accumulator totals by field.
fn node_json(result: &CentralityResult, m: &centrality_core::NodeMeasures) -> Value {
    let mut obj = Map::new();
    obj.insert("id".into(), json!(m.id));
    for measure in Measure::ALL {
        if let Some(v) = m.get(measure) {
            obj.insert(measure.name().into(), json!(v));
        }
        if let Some(v) = m.normalized(measure) {
            obj.insert(format!("{}_norm", measure.name()), json!(v));
        }
    }
    for (field, total) in result.accumulator_fields().iter().zip(&m.accumulations) {
        obj.insert(field.clone(), json!(total));
    }
    Value::Object(obj)
}

/// Run the engine while a watcher thread logs progress every few seconds.
fn run_with_progress(graph: &Graph, config: &CentralityConfig) -> Result<CentralityResult> {
    let control = RunControl::new();
    let done = AtomicBool::new(false);

    let result = std::thread::scope(|scope| {
        scope.spawn(|| {
            let mut ticks = 0u32;
            while !done.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(100));
                ticks += 1;
                if ticks % 50 == 0 {
                    info!(
                        completed = control.progress.completed(),
                        total = control.progress.total(),
                        "progress {:.0}%",
                        control.progress.fraction() * 100.0
                    );
                }
            }
        });
        let result = compute_centrality_with(graph, config, &control);
        done.store(true, Ordering::Relaxed);
        result
    })?;
    Ok(result)
}

// ---------------------------------------------------------------------------
// generate: timing tables
// ---------------------------------------------------------------------------

fn generate(args: GenerateArgs) -> Result<()> {
    let generators: Vec<(&str, fn(u64) -> Result<Graph>)> = match args.topology {
        Topology::Grid => vec![("Street grid", gen_grid)],
        Topology::SmallWorld => vec![("Small-world ring", gen_small_world)],
        Topology::Geometric => vec![("Random geometric", gen_geometric)],
        Topology::Barbell => vec![("Barbell (district-road-district)", gen_barbell)],
        Topology::Dla => vec![("DLA (organic branching)", gen_dla)],
        Topology::All => vec![
            ("Street grid", gen_grid as fn(u64) -> Result<Graph>),
            ("Small-world ring", gen_small_world),
            ("Random geometric", gen_geometric),
            ("Barbell (district-road-district)", gen_barbell),
            ("DLA (organic branching)", gen_dla),
        ],
    };

    println!("centrality-bench");
    println!("================");
    println!();

    let mut config = args.engine.config();
    if args.accumulate {
        config.accumulators = vec![TIME_FIELD.to_string()];
    }
    for (name, generator) in generators {
        run_benchmark(name, generator, args.nodes, &config)?;
    }
    Ok(())
}

fn run_benchmark(
    name: &str,
    generator: fn(u64) -> Result<Graph>,
    node_count: u64,
    config: &CentralityConfig,
) -> Result<()> {
    println!("--- {} ---", name);
    println!("Target: {} nodes", node_count);

    let t = Instant::now();
    let graph = generator(node_count)?;
    println!(
        "Generated in {:.2}s: {} nodes, {} edges, ~{:.1}MB",
        t.elapsed().as_secs_f64(),
        graph.node_count(),
        graph.edge_count(),
        graph.memory_usage() as f64 / 1_048_576.0
    );
    if graph.is_empty() {
        println!();
        return Ok(());
    }

    // Single-source searches from the first node
    let source = graph.node(0).id;
    println!();
    println!("{:>10} {:>12} {:>12} {:>10}", "radius", "found", "farthest", "time");
    println!("{:->10} {:->12} {:->12} {:->10}", "", "", "", "");
    for r in [2.0, 5.0, 10.0, 20.0, 50.0, f64::INFINITY] {
        let t = Instant::now();
        let found = shortest_distances(&graph, source, to_radius(Some(r))).unwrap_or_default();
        let elapsed = t.elapsed();
        let farthest = found.last().map(|&(_, d)| d).unwrap_or(0.0);
        println!(
            "{:>10} {:>12} {:>12.2} {:>8.2}ms",
            r,
            found.len(),
            farthest,
            elapsed.as_secs_f64() * 1000.0
        );
        if found.len() >= graph.node_count() {
            println!("{:>10} (entire graph reached)", "");
            break;
        }
    }

    // Full all-sources run with the requested configuration
    println!();
    let t = Instant::now();
    let result = compute_centrality_with(&graph, config, &RunControl::new())?;
    let elapsed = t.elapsed();
    println!(
        "All-sources run ({}): {:.1}ms",
        result.computed(),
        elapsed.as_secs_f64() * 1000.0
    );
    println!("{:>14} {:>14} {:>14}", "measure", "mean", "max");
    println!("{:->14} {:->14} {:->14}", "", "", "");
    for measure in result.computed().iter() {
        let values: Vec<f64> = result.iter().filter_map(|m| m.get(measure)).collect();
        if values.is_empty() {
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        println!("{:>14} {:>14.4} {:>14.4}", measure.name(), mean, max);
    }
    for field in result.accumulator_fields() {
        let total: f64 = result
            .iter()
            .filter_map(|m| result.accumulation(m.id, field))
            .sum();
        let mean = total / result.len() as f64;
        println!("{:>14} {:>14.4}", field, mean);
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Generators: deterministic, with locations and Euclidean edge costs
// ---------------------------------------------------------------------------

/// Accumulator declared on every generated network: travel time at a
/// per-edge random speed.
const TIME_FIELD: &str = "time";

/// Simple LCG for deterministic, fast pseudo-random numbers.
struct FastRng(u64);

impl FastRng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next(&mut self, max: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 33) % max
    }
    fn next_f64(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Builder that places nodes and links them with Euclidean costs.
struct Network {
    graph: Graph,
    positions: Vec<(f64, f64)>,
    rng: FastRng,
}

impl Network {
    fn new(seed: u64, node_count: u64) -> Result<Self> {
        let mut graph = Graph::with_accumulators([TIME_FIELD])?;
        // Generators average well under three links per node
        graph.reserve(node_count as usize, node_count as usize * 3);
        Ok(Self {
            graph,
            positions: Vec::with_capacity(node_count as usize),
            rng: FastRng::new(seed),
        })
    }

    /// Place a node at `(x, y)`. Ids are assigned densely from 0.
    fn place(&mut self, x: f64, y: f64) -> Result<u64> {
        let id = self.positions.len() as u64;
        self.positions.push((x, y));
        // Weights vary like block populations
        let weight = 0.5 + self.rng.next_f64();
        self.graph.add_node(id, weight)?;
        self.graph.set_location(id, x, y)?;
        Ok(id)
    }

    fn link(&mut self, a: u64, b: u64) -> Result<()> {
        if a == b {
            return Ok(());
        }
        let (ax, ay) = self.positions[a as usize];
        let (bx, by) = self.positions[b as usize];
        let cost = (ax - bx).hypot(ay - by);
        let speed = 0.5 + self.rng.next_f64();
        self.graph
            .add_edge(a, b, cost, &[cost / speed])
            .with_context(|| format!("linking {a} and {b}"))?;
        Ok(())
    }

    fn finish(self) -> Graph {
        self.graph
    }
}

/// Jittered square grid with unit block spacing.
fn gen_grid(node_count: u64) -> Result<Graph> {
    let side = (node_count as f64).sqrt().ceil().max(1.0) as u64;
    let mut net = Network::new(42, side * side)?;
    for r in 0..side {
        for c in 0..side {
            let jx = (net.rng.next_f64() - 0.5) * 0.2;
            let jy = (net.rng.next_f64() - 0.5) * 0.2;
            net.place(c as f64 + jx, r as f64 + jy)?;
        }
    }
    for r in 0..side {
        for c in 0..side {
            let id = r * side + c;
            if c + 1 < side {
                net.link(id, id + 1)?;
            }
            if r + 1 < side {
                net.link(id, id + side)?;
            }
        }
    }
    Ok(net.finish())
}

/// Small-world: ring of towns, each linked to its K nearest neighbors on
/// each side, with each link rewired to a random town with probability p.
fn gen_small_world(node_count: u64) -> Result<Graph> {
    let k = 3u64;
    let p = 0.05f64;
    let n = node_count.max(2);
    let mut net = Network::new(67890, n)?;
    let circumference = n as f64;
    let r = circumference / std::f64::consts::TAU;
    for i in 0..n {
        let angle = i as f64 / n as f64 * std::f64::consts::TAU;
        net.place(r * angle.cos(), r * angle.sin())?;
    }
    for i in 0..n {
        for j in 1..=k {
            let neighbor = (i + j) % n;
            if net.rng.next_f64() < p {
                let rewired = net.rng.next(n);
                net.link(i, if rewired != i { rewired } else { neighbor })?;
            } else {
                net.link(i, neighbor)?;
            }
        }
    }
    Ok(net.finish())
}

/// Random geometric: points uniform in a square of area n, linked when
/// closer than a fixed threshold. Cell bucketing keeps it near O(n).
fn gen_geometric(node_count: u64) -> Result<Graph> {
    let threshold = 1.6f64;
    let n = node_count.max(1);
    let extent = (n as f64).sqrt();
    let mut net = Network::new(54321, n)?;
    for _ in 0..n {
        let x = net.rng.next_f64() * extent;
        let y = net.rng.next_f64() * extent;
        net.place(x, y)?;
    }

    let cells = (extent / threshold).ceil().max(1.0) as usize;
    let cell_of = |v: f64| ((v / threshold) as usize).min(cells - 1);
    let mut buckets: Vec<Vec<u64>> = vec![Vec::new(); cells * cells];
    for (id, &(x, y)) in net.positions.iter().enumerate() {
        buckets[cell_of(y) * cells + cell_of(x)].push(id as u64);
    }

    let mut pairs = Vec::new();
    for (id, &(x, y)) in net.positions.iter().enumerate() {
        let (cx, cy) = (cell_of(x), cell_of(y));
        for ny in cy.saturating_sub(1)..=(cy + 1).min(cells - 1) {
            for nx in cx.saturating_sub(1)..=(cx + 1).min(cells - 1) {
                for &other in &buckets[ny * cells + nx] {
                    if other <= id as u64 {
                        continue;
                    }
                    let (ox, oy) = net.positions[other as usize];
                    if (x - ox).hypot(y - oy) <= threshold {
                        pairs.push((id as u64, other));
                    }
                }
            }
        }
    }
    for (a, b) in pairs {
        net.link(a, b)?;
    }
    Ok(net.finish())
}

/// Barbell: two dense districts joined by a chain of road nodes. Every
/// cross-district path runs through the chain.
fn gen_barbell(node_count: u64) -> Result<Graph> {
    let bridge_len = 10u64;
    let district = (node_count.saturating_sub(bridge_len) / 2).max(2);
    let mut net = Network::new(99999, district * 2 + bridge_len)?;
    let spread = (district as f64).sqrt();
    let offset = spread * 2.0 + bridge_len as f64;

    let place_district = |net: &mut Network, cx: f64| -> Result<u64> {
        let first = net.positions.len() as u64;
        for _ in 0..district {
            let x = cx + (net.rng.next_f64() - 0.5) * spread;
            let y = (net.rng.next_f64() - 0.5) * spread;
            net.place(x, y)?;
        }
        for i in 0..district {
            for _ in 0..4u64.min(district - 1) {
                let target = net.rng.next(district);
                net.link(first + i, first + target)?;
            }
        }
        Ok(first)
    };

    let a = place_district(&mut net, -offset / 2.0)?;
    let mut prev = a + district - 1;
    for i in 0..bridge_len {
        let x = -(bridge_len as f64) / 2.0 + i as f64;
        let id = net.place(x, 0.0)?;
        net.link(prev, id)?;
        prev = id;
    }
    let b = place_district(&mut net, offset / 2.0)?;
    net.link(prev, b)?;
    Ok(net.finish())
}

/// DLA: each new node steps off a random recent "surface" node, with an
/// occasional second link that closes a loop.
fn gen_dla(node_count: u64) -> Result<Graph> {
    let mut net = Network::new(77777, node_count.max(1))?;
    net.place(0.0, 0.0)?;

    let surface_max = 200usize;
    let mut surface: VecDeque<u64> = VecDeque::with_capacity(surface_max + 1);
    surface.push_back(0);

    for new_node in 1..node_count {
        let parent = surface[net.rng.next(surface.len() as u64) as usize];
        let (px, py) = net.positions[parent as usize];
        let angle = net.rng.next_f64() * std::f64::consts::TAU;
        let id = net.place(px + angle.cos(), py + angle.sin())?;
        net.link(id, parent)?;

        // 10% chance of a second connection
        if net.rng.next(10) == 0 && new_node > 1 {
            let other = net.rng.next(new_node);
            net.link(id, other)?;
        }

        surface.push_back(id);
        if surface.len() > surface_max {
            surface.pop_front();
        }
    }
    Ok(net.finish())
}
