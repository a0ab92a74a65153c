//! Physical network topologies and effective point-to-point latencies
//!
//! A [`Graph`] describes which nodes are physically linked and how long a
//! message takes to cross each link. Nodes that are not adjacent still reach
//! each other through intermediate hops, so peers are wired with the shortest
//! path latency taken from [`Graph::all_pairs_shortest_paths`].

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, VecDeque},
};

use rand::Rng;
use rand_distr::{Distribution, Normal};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::utils::RandomMultiset;

/// Message delay in milliseconds.
pub type Latency = u64;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TopologyError {
    #[error("cannot build a topology with zero nodes")]
    EmptyGraph,
    #[error("{edges} edges cannot connect {nodes} nodes")]
    TooFewEdges { nodes: usize, edges: usize },
    #[error("{nodes} nodes hold at most {max} edges, {edges} requested")]
    TooManyEdges { nodes: usize, edges: usize, max: usize },
    #[error("invalid latency distribution (mean {mean}, standard deviation {std_dev})")]
    InvalidLatency { mean: f64, std_dev: f64 },
    #[error("matrix row {row} has {len} entries, expected {expected}")]
    NotSquare { row: usize, len: usize, expected: usize },
    #[error("topology describes {expected} nodes, but {got} were given")]
    SizeMismatch { expected: usize, got: usize },
}

/// Gaussian latency model clipped at zero.
#[derive(Debug, Clone, Copy)]
pub struct LatencyDist {
    normal: Normal<f64>,
}

impl LatencyDist {
    pub fn new(mean: f64, std_dev: f64) -> Result<Self, TopologyError> {
        let invalid = TopologyError::InvalidLatency { mean, std_dev };
        if !mean.is_finite() || mean < 0.0 {
            return Err(invalid);
        }

        let normal = Normal::new(mean, std_dev).map_err(|_| invalid)?;
        Ok(Self { normal })
    }

    /// Latency distribution whose standard deviation is `factor * mean`.
    pub fn with_deviation_factor(
        mean: f64,
        factor: f64,
    ) -> Result<Self, TopologyError> {
        Self::new(mean, mean * factor)
    }

    /// Draws `max(0, N(mean, std_dev))`, truncated to whole milliseconds.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Latency {
        self.normal.sample(rng).max(0.0) as Latency
    }
}

/// Directed, weighted link to another node of a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub to: usize,
    pub latency: Latency,
}

/// Adjacency-list representation of a physical topology. Nodes are
/// identified by their index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    adj: Vec<Vec<Edge>>,
}

impl Graph {
    /// Creates a graph with `nodes` nodes and no edges.
    pub fn with_nodes(nodes: usize) -> Self {
        Self { adj: vec![Vec::new(); nodes] }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.adj.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }

    /// Outgoing links of `node`.
    #[inline]
    pub fn edges(&self, node: usize) -> &[Edge] {
        &self.adj[node]
    }

    #[inline]
    pub fn degree(&self, node: usize) -> usize {
        self.adj[node].len()
    }

    /// Total number of directed links. An undirected edge counts twice.
    pub fn arc_count(&self) -> usize {
        self.adj.iter().map(Vec::len).sum()
    }

    pub fn is_adjacent(&self, from: usize, to: usize) -> bool {
        self.adj[from].iter().any(|edge| edge.to == to)
    }

    /// Adds a directed link.
    pub fn add_arc(&mut self, from: usize, to: usize, latency: Latency) {
        self.adj[from].push(Edge { to, latency });
    }

    /// Adds a link in both directions with the same latency.
    pub fn add_edge(&mut self, a: usize, b: usize, latency: Latency) {
        self.add_arc(a, b, latency);
        self.add_arc(b, a, latency);
    }

    /// Creates a connected random graph with `edges` undirected edges.
    ///
    /// A random spanning tree is built first by attaching every node `i` to a
    /// uniformly chosen earlier node. The remaining edges join random pairs of
    /// distinct, non-adjacent nodes which are not yet linked to every other
    /// node. Every latency is drawn from `latency`.
    pub fn random<R: Rng + ?Sized>(
        nodes: usize,
        edges: usize,
        latency: &LatencyDist,
        rng: &mut R,
    ) -> Result<Self, TopologyError> {
        if nodes == 0 {
            return Err(TopologyError::EmptyGraph);
        }
        let max = nodes * (nodes - 1) / 2;
        if edges < nodes - 1 {
            return Err(TopologyError::TooFewEdges { nodes, edges });
        }
        if edges > max {
            return Err(TopologyError::TooManyEdges { nodes, edges, max });
        }

        let mut graph = Self::with_nodes(nodes);
        for i in 1..nodes {
            let j = rng.gen_range(0..i);
            graph.add_edge(i, j, latency.sample(rng));
        }

        // Each node appears once per missing neighbor, so saturated nodes are
        // never drawn.
        let saturated = nodes - 1;
        let mut open = RandomMultiset::with_capacity(nodes * saturated);
        for node in 0..nodes {
            open.insert_n(node, saturated - graph.degree(node));
        }

        let mut rejected = vec![];
        for _ in saturated..edges {
            let x = open
                .remove_random(rng)
                .expect("unsaturated node while edges remain");
            let y = loop {
                let y = open
                    .remove_random(rng)
                    .expect("unsaturated node has a non-adjacent partner");
                if y != x && !graph.is_adjacent(x, y) {
                    break y;
                }
                rejected.push(y);
            };
            for node in rejected.drain(..) {
                open.insert(node);
            }

            graph.add_edge(x, y, latency.sample(rng));
        }

        debug_assert_eq!(open.len(), nodes * saturated - 2 * edges);
        Ok(graph)
    }

    /// Creates a graph from a matrix whose entry `(i, j)` is the latency of
    /// the link from `i` to `j`, or `None` if there is no such link. The
    /// diagonal is ignored.
    pub fn from_adj_matrix(
        matrix: &[Vec<Option<Latency>>],
    ) -> Result<Self, TopologyError> {
        check_square(matrix)?;

        let n = matrix.len();
        let mut graph = Self::with_nodes(n);
        for (i, row) in matrix.iter().enumerate() {
            for (j, entry) in row.iter().enumerate() {
                match entry {
                    Some(latency) if i != j => graph.add_arc(i, j, *latency),
                    _ => (),
                }
            }
        }

        Ok(graph)
    }

    /// Creates a graph from a connectivity matrix, where `true` at `(i, j)`
    /// links `i` to `j`. Latencies are drawn from `latency`. If `symmetric`
    /// is set, a link in either direction creates both directions with one
    /// shared latency.
    pub fn from_bool_matrix<R: Rng + ?Sized>(
        matrix: &[Vec<bool>],
        latency: &LatencyDist,
        symmetric: bool,
        rng: &mut R,
    ) -> Result<Self, TopologyError> {
        check_square(matrix)?;

        let n = matrix.len();
        let mut weights = vec![vec![None; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                if matrix[i][j] {
                    let sample = latency.sample(rng);
                    weights[i][j] = Some(sample);
                    if symmetric {
                        weights[j][i] = Some(sample);
                        continue;
                    }
                }
                if matrix[j][i] {
                    let sample = latency.sample(rng);
                    weights[j][i] = Some(sample);
                    if symmetric {
                        weights[i][j] = Some(sample);
                    }
                }
            }
        }

        Self::from_adj_matrix(&weights)
    }

    /// Returns true iff every node can be reached from node 0. For graphs
    /// whose links all go both ways this is ordinary connectivity.
    pub fn is_connected(&self) -> bool {
        if self.is_empty() {
            return true;
        }

        let mut seen = vec![false; self.len()];
        let mut queue = VecDeque::from([0]);
        seen[0] = true;
        while let Some(node) = queue.pop_front() {
            for edge in &self.adj[node] {
                if !seen[edge.to] {
                    seen[edge.to] = true;
                    queue.push_back(edge.to);
                }
            }
        }

        seen.into_iter().all(|s| s)
    }

    /// Single-source shortest path latencies from `source`. Unreachable nodes
    /// map to `None`.
    pub fn dijkstra(&self, source: usize) -> Vec<Option<Latency>> {
        let mut dist = vec![None; self.len()];
        let mut heap: BinaryHeap<Reverse<(Latency, usize)>> = BinaryHeap::new();

        dist[source] = Some(0);
        heap.push(Reverse((0, source)));

        while let Some(Reverse((d, node))) = heap.pop() {
            if matches!(dist[node], Some(best) if d > best) {
                continue;
            }

            for edge in &self.adj[node] {
                let candidate = d.saturating_add(edge.latency);
                if dist[edge.to].map_or(true, |best| candidate < best) {
                    dist[edge.to] = Some(candidate);
                    heap.push(Reverse((candidate, edge.to)));
                }
            }
        }

        dist
    }

    /// Runs [`Graph::dijkstra`] from every node.
    pub fn all_pairs_shortest_paths(&self) -> DistanceMatrix {
        #[cfg(feature = "rayon")]
        let rows = (0..self.len())
            .into_par_iter()
            .map(|source| self.dijkstra(source))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let rows =
            (0..self.len()).map(|source| self.dijkstra(source)).collect();

        DistanceMatrix { rows }
    }
}

fn check_square<T>(matrix: &[Vec<T>]) -> Result<(), TopologyError> {
    let expected = matrix.len();
    if expected == 0 {
        return Err(TopologyError::EmptyGraph);
    }

    match matrix.iter().enumerate().find(|(_, row)| row.len() != expected) {
        Some((row, entries)) => Err(TopologyError::NotSquare {
            row,
            len: entries.len(),
            expected,
        }),
        None => Ok(()),
    }
}

/// Dense matrix of shortest path latencies between every pair of nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistanceMatrix {
    rows: Vec<Vec<Option<Latency>>>,
}

impl DistanceMatrix {
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Shortest path latency from `from` to `to`, if `to` is reachable.
    #[inline]
    pub fn get(&self, from: usize, to: usize) -> Option<Latency> {
        self.rows[from][to]
    }

    /// Largest finite entry. Used as the delivery drain timeout of a round.
    pub fn max(&self) -> Latency {
        self.rows.iter().flatten().flatten().copied().max().unwrap_or(0)
    }

    /// Returns true iff every node reaches every other node.
    pub fn is_complete(&self) -> bool {
        self.rows.iter().flatten().all(Option::is_some)
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.len();
        (0..n).all(|i| (i + 1..n).all(|j| self.rows[i][j] == self.rows[j][i]))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    use super::{Graph, LatencyDist, TopologyError};

    fn latency() -> LatencyDist {
        LatencyDist::new(50.0, 10.0).unwrap()
    }

    #[test]
    fn spanning_tree_when_edges_equal_nodes_minus_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let graph = Graph::random(5, 4, &latency(), &mut rng).unwrap();

        assert_eq!(graph.arc_count(), 8);
        assert!(graph.is_connected());
        assert!(graph.all_pairs_shortest_paths().is_complete());
    }

    #[test]
    fn complete_graph_is_reachable() {
        let mut rng = StdRng::seed_from_u64(2);
        let graph = Graph::random(6, 15, &latency(), &mut rng).unwrap();

        for a in 0..6 {
            assert_eq!(graph.degree(a), 5);
            for b in 0..6 {
                assert_eq!(graph.is_adjacent(a, b), a != b);
            }
        }
    }

    #[test]
    fn rejects_impossible_edge_counts() {
        let mut rng = StdRng::seed_from_u64(3);

        assert_eq!(
            Graph::random(5, 3, &latency(), &mut rng),
            Err(TopologyError::TooFewEdges { nodes: 5, edges: 3 })
        );
        assert_eq!(
            Graph::random(4, 7, &latency(), &mut rng),
            Err(TopologyError::TooManyEdges { nodes: 4, edges: 7, max: 6 })
        );
        assert_eq!(
            Graph::random(0, 0, &latency(), &mut rng),
            Err(TopologyError::EmptyGraph)
        );
    }

    #[test]
    fn latency_is_never_negative() {
        let mut rng = StdRng::seed_from_u64(4);
        let dist = LatencyDist::new(1.0, 100.0).unwrap();

        // Half of the raw samples fall below zero and are clipped.
        let zeros = (0..1000).filter(|_| dist.sample(&mut rng) == 0).count();
        assert!(zeros > 300);
        assert!(LatencyDist::new(-1.0, 1.0).is_err());
        assert!(LatencyDist::new(1.0, -1.0).is_err());
    }

    #[test]
    fn dijkstra_prefers_multi_hop_paths() {
        let mut graph = Graph::with_nodes(4);
        graph.add_edge(0, 1, 5);
        graph.add_edge(1, 2, 5);
        graph.add_edge(0, 2, 20);
        graph.add_edge(2, 3, 1);

        let dist = graph.all_pairs_shortest_paths();

        assert_eq!(dist.get(0, 2), Some(10));
        assert_eq!(dist.get(3, 0), Some(11));
        assert_eq!(dist.max(), 11);
        assert!(dist.is_symmetric());
    }

    #[test]
    fn directed_matrix_gives_asymmetric_distances() {
        let matrix = vec![
            vec![None, Some(3), None],
            vec![None, None, Some(4)],
            vec![Some(10), None, None],
        ];
        let dist = Graph::from_adj_matrix(&matrix)
            .unwrap()
            .all_pairs_shortest_paths();

        assert_eq!(dist.get(0, 2), Some(7));
        assert_eq!(dist.get(2, 0), Some(10));
        assert_eq!(dist.get(1, 0), Some(14));
        assert!(!dist.is_symmetric());
    }

    #[test]
    fn unreachable_nodes_have_no_distance() {
        let matrix = vec![
            vec![None, Some(1), None],
            vec![None, None, None],
            vec![None, None, None],
        ];
        let graph = Graph::from_adj_matrix(&matrix).unwrap();
        let dist = graph.all_pairs_shortest_paths();

        assert!(!graph.is_connected());
        assert_eq!(dist.get(0, 2), None);
        assert!(!dist.is_complete());
        assert_eq!(dist.max(), 1);
    }

    #[test]
    fn bool_matrix_symmetric_latencies() {
        let mut rng = StdRng::seed_from_u64(5);
        let ring = vec![
            vec![false, true, false, false],
            vec![false, false, true, false],
            vec![false, false, false, true],
            vec![true, false, false, false],
        ];
        let graph =
            Graph::from_bool_matrix(&ring, &latency(), true, &mut rng).unwrap();

        assert_eq!(graph.arc_count(), 8);
        assert!(graph.all_pairs_shortest_paths().is_symmetric());

        let directed =
            Graph::from_bool_matrix(&ring, &latency(), false, &mut rng)
                .unwrap();
        assert_eq!(directed.arc_count(), 4);
        assert!(directed.is_connected());
    }

    #[test]
    fn ragged_matrix_is_rejected() {
        let matrix = vec![vec![None, Some(1)], vec![None]];

        assert_eq!(
            Graph::from_adj_matrix(&matrix),
            Err(TopologyError::NotSquare { row: 1, len: 1, expected: 2 })
        );
    }

    proptest! {
        #[test]
        fn random_graphs_are_connected(
            nodes in 1usize..16,
            extra in 0.0f64..=1.0,
            seed in any::<u64>(),
        ) {
            let max = nodes * (nodes - 1) / 2;
            let edges = (nodes - 1) + ((max - (nodes - 1)) as f64 * extra) as usize;
            let mut rng = StdRng::seed_from_u64(seed);

            let graph = Graph::random(nodes, edges, &latency(), &mut rng).unwrap();
            let dist = graph.all_pairs_shortest_paths();

            prop_assert_eq!(graph.arc_count(), 2 * edges);
            prop_assert!(graph.is_connected());
            prop_assert!(dist.is_complete());
            prop_assert!(dist.is_symmetric());
            for node in 0..nodes {
                prop_assert_eq!(dist.get(node, node), Some(0));
                prop_assert!(!graph.is_adjacent(node, node));
            }
        }
    }
}
