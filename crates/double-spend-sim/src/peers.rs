/*!
Peer topology strategies

A [`PeerStrategy`] links the nodes of one sub-network (the trusted nodes or
the attacker nodes) with each other. A [`ConnectionStrategy`] links the two
sub-networks. Both return the largest latency they assigned, which bounds how
long deliveries of a round may stay in flight.

Graph based strategies describe a physical topology and collapse every
multi-hop path into a single link whose latency is the shortest path
latency, so each node is linked to every node it can reach.

# Built-In Strategies
- Constant latency between every pair [`constant::Constant`]
- Latency from distances on a plane [`euclidean::Euclidean`]
- Shortest paths of a given graph [`graph::FixedGraph`]
- Shortest paths of a fresh random graph [`graph::RandomGraph`]
- Every trusted node linked to every attacker [`connection::ConstantConnection`]
*/

use std::{fmt::Debug, sync::Arc};

use rand::rngs::StdRng;

use crate::{
    graph::{DistanceMatrix, Latency, TopologyError},
    node::{Node, Peer},
    params::LinkParams,
};

pub mod connection;
pub mod constant;
pub mod euclidean;
pub mod graph;

pub use connection::ConstantConnection;
pub use constant::Constant;
pub use euclidean::Euclidean;
pub use graph::{FixedGraph, RandomGraph};

/// Wires the nodes of one sub-network.
pub trait PeerStrategy: Debug + dyn_clone::DynClone + Send + Sync {
    /// Returns the name of this strategy.
    fn name(&self) -> String;

    /// Adds peer links between `nodes`. Returns the largest latency used.
    fn connect_peers(
        &self,
        nodes: &[Arc<Node>],
        link: &LinkParams,
        rng: &mut StdRng,
    ) -> Result<Latency, TopologyError>;
}

dyn_clone::clone_trait_object!(PeerStrategy);

/// Wires trusted nodes to attacker nodes.
pub trait ConnectionStrategy: Debug + dyn_clone::DynClone + Send + Sync {
    fn name(&self) -> String;

    /// Adds peer links between `trusted` and `attackers`. Returns the largest
    /// latency used.
    fn connect(
        &self,
        trusted: &[Arc<Node>],
        attackers: &[Arc<Node>],
        link: &LinkParams,
        rng: &mut StdRng,
    ) -> Result<Latency, TopologyError>;
}

dyn_clone::clone_trait_object!(ConnectionStrategy);

/// Links every ordered pair `(i, j)` of `nodes` for which `distances` has a
/// path, using the path latency.
pub(crate) fn connect_with_distances(
    nodes: &[Arc<Node>],
    distances: &DistanceMatrix,
) -> Result<Latency, TopologyError> {
    if distances.len() != nodes.len() {
        return Err(TopologyError::SizeMismatch {
            expected: distances.len(),
            got: nodes.len(),
        });
    }

    for (i, node) in nodes.iter().enumerate() {
        for (j, peer) in nodes.iter().enumerate() {
            if i == j {
                continue;
            }
            if let Some(latency) = distances.get(i, j) {
                node.add_peer(Peer { node: peer.id(), latency });
            }
        }
    }

    Ok(distances.max())
}

/// Links `a` and `b` in both directions with the same latency.
pub(crate) fn link_both_ways(a: &Node, b: &Node, latency: Latency) {
    a.add_peer(Peer { node: b.id(), latency });
    b.add_peer(Peer { node: a.id(), latency });
}
