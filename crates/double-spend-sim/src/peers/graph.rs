//! Strategies backed by a physical topology graph

use std::sync::Arc;

use log::debug;
use rand::{rngs::StdRng, Rng};

use crate::{
    graph::{DistanceMatrix, Graph, Latency, LatencyDist, TopologyError},
    node::Node,
    params::LinkParams,
    peers::{connect_with_distances, PeerStrategy},
};

/// Uses the shortest paths of a fixed graph. The graph must have exactly one
/// vertex per node of the sub-network it wires; vertex `i` is the `i`-th
/// node.
#[derive(Debug, Clone)]
pub struct FixedGraph {
    graph: Graph,
    distances: DistanceMatrix,
}

impl FixedGraph {
    pub fn new(graph: Graph) -> Result<Self, TopologyError> {
        if graph.is_empty() {
            return Err(TopologyError::EmptyGraph);
        }

        let distances = graph.all_pairs_shortest_paths();
        Ok(Self { graph, distances })
    }

    /// See [`Graph::from_adj_matrix`].
    pub fn from_adj_matrix(
        matrix: &[Vec<Option<Latency>>],
    ) -> Result<Self, TopologyError> {
        Self::new(Graph::from_adj_matrix(matrix)?)
    }

    /// See [`Graph::from_bool_matrix`].
    pub fn from_bool_matrix<R: Rng + ?Sized>(
        matrix: &[Vec<bool>],
        latency: &LatencyDist,
        symmetric: bool,
        rng: &mut R,
    ) -> Result<Self, TopologyError> {
        Self::new(Graph::from_bool_matrix(matrix, latency, symmetric, rng)?)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn distances(&self) -> &DistanceMatrix {
        &self.distances
    }
}

impl PeerStrategy for FixedGraph {
    fn name(&self) -> String {
        "Fixed Graph".to_string()
    }

    fn connect_peers(
        &self,
        nodes: &[Arc<Node>],
        _link: &LinkParams,
        _rng: &mut StdRng,
    ) -> Result<Latency, TopologyError> {
        connect_with_distances(nodes, &self.distances)
    }
}

/// Builds a new connected random graph every time it wires a sub-network.
/// The graph holds `density * n(n-1)/2` edges, but never fewer than a
/// spanning tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomGraph;

impl RandomGraph {
    /// Number of edges of a random graph over `nodes` vertices.
    pub fn edge_count(nodes: usize, density: f64) -> usize {
        if nodes < 2 {
            return 0;
        }

        let max = nodes * (nodes - 1) / 2;
        let wanted = (density * max as f64) as usize;
        wanted.clamp(nodes - 1, max)
    }
}

impl PeerStrategy for RandomGraph {
    fn name(&self) -> String {
        "Random Graph".to_string()
    }

    fn connect_peers(
        &self,
        nodes: &[Arc<Node>],
        link: &LinkParams,
        rng: &mut StdRng,
    ) -> Result<Latency, TopologyError> {
        let latency = link.latency_dist()?;
        if nodes.len() < 2 {
            return Ok(0);
        }

        let edges = Self::edge_count(nodes.len(), link.density);
        let graph = Graph::random(nodes.len(), edges, &latency, rng)?;
        debug!("random graph with {} nodes and {} edges", nodes.len(), edges);

        connect_with_distances(nodes, &graph.all_pairs_shortest_paths())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::{FixedGraph, RandomGraph};
    use crate::{
        graph::{Graph, TopologyError},
        peers::{test_utils, PeerStrategy},
    };

    #[test]
    fn line_graph_links_distant_nodes_by_path_latency() {
        let mut line = Graph::with_nodes(3);
        line.add_edge(0, 1, 10);
        line.add_edge(1, 2, 15);
        let strategy = FixedGraph::new(line).unwrap();
        let nodes = test_utils::nodes(0, 3);
        let mut rng = StdRng::seed_from_u64(0);

        let max = strategy
            .connect_peers(&nodes, &test_utils::link(1.0, 1.0), &mut rng)
            .unwrap();

        assert_eq!(max, 25);
        let far = nodes[0].peers().into_iter().find(|p| p.node.get() == 2).unwrap();
        assert_eq!(far.latency, 25);
    }

    #[test]
    fn directed_matrix_skips_unreachable_pairs() {
        let matrix = vec![
            vec![None, Some(3)],
            vec![None, None],
        ];
        let strategy = FixedGraph::from_adj_matrix(&matrix).unwrap();
        let nodes = test_utils::nodes(0, 2);
        let mut rng = StdRng::seed_from_u64(0);

        strategy
            .connect_peers(&nodes, &test_utils::link(1.0, 1.0), &mut rng)
            .unwrap();

        assert_eq!(nodes[0].peers().len(), 1);
        assert!(nodes[1].peers().is_empty());
    }

    #[test]
    fn node_count_must_match_graph() {
        let strategy = FixedGraph::new(Graph::with_nodes(4)).unwrap();
        let nodes = test_utils::nodes(0, 3);
        let mut rng = StdRng::seed_from_u64(0);

        let err = strategy
            .connect_peers(&nodes, &test_utils::link(1.0, 1.0), &mut rng)
            .unwrap_err();

        assert_eq!(err, TopologyError::SizeMismatch { expected: 4, got: 3 });
    }

    #[test]
    fn edge_count_is_clamped() {
        assert_eq!(RandomGraph::edge_count(1, 0.5), 0);
        assert_eq!(RandomGraph::edge_count(10, 0.0), 9);
        assert_eq!(RandomGraph::edge_count(10, 0.5), 22);
        assert_eq!(RandomGraph::edge_count(10, 1.0), 45);
    }

    #[test]
    fn random_graph_reaches_every_node() {
        let nodes = test_utils::nodes(0, 12);
        let mut rng = StdRng::seed_from_u64(21);

        RandomGraph
            .connect_peers(&nodes, &test_utils::link(20.0, 0.2), &mut rng)
            .unwrap();

        assert!(nodes.iter().all(|node| node.peers().len() == 11));
    }
}
