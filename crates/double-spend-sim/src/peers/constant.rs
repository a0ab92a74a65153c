//! Same latency distribution between every pair of nodes

use std::sync::Arc;

use rand::rngs::StdRng;

use crate::{
    graph::{Latency, TopologyError},
    node::Node,
    params::LinkParams,
    peers::{link_both_ways, PeerStrategy},
};

/// Links every pair of nodes both ways. Each pair gets one latency sampled
/// around the configured mean.
#[derive(Debug, Default, Clone, Copy)]
pub struct Constant;

impl PeerStrategy for Constant {
    fn name(&self) -> String {
        "Constant".to_string()
    }

    fn connect_peers(
        &self,
        nodes: &[Arc<Node>],
        link: &LinkParams,
        rng: &mut StdRng,
    ) -> Result<Latency, TopologyError> {
        let latency = link.latency_dist()?;

        let mut max = 0;
        for (i, a) in nodes.iter().enumerate() {
            for b in &nodes[i + 1..] {
                let sample = latency.sample(rng);
                link_both_ways(a, b, sample);
                max = max.max(sample);
            }
        }

        Ok(max)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::Constant;
    use crate::peers::{test_utils, PeerStrategy};

    #[test]
    fn every_pair_is_linked_symmetrically() {
        let nodes = test_utils::nodes(0, 5);
        let mut rng = StdRng::seed_from_u64(4);

        let max = Constant
            .connect_peers(&nodes, &test_utils::link(100.0, 0.0), &mut rng)
            .unwrap();

        for node in &nodes {
            let peers = node.peers();
            assert_eq!(peers.len(), 4);
            for peer in peers {
                assert!(peer.latency <= max);
                let back = nodes[peer.node.get()]
                    .peers()
                    .into_iter()
                    .find(|p| p.node == node.id())
                    .unwrap();
                assert_eq!(back.latency, peer.latency);
            }
        }
    }
}
