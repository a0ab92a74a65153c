//! Links between the trusted and the attacker sub-networks

use std::sync::Arc;

use rand::rngs::StdRng;

use crate::{
    graph::{Latency, TopologyError},
    node::Node,
    params::LinkParams,
    peers::{link_both_ways, ConnectionStrategy},
};

/// Links every attacker to every trusted node both ways. Each pair gets one
/// latency sampled around the configured mean.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantConnection;

impl ConnectionStrategy for ConstantConnection {
    fn name(&self) -> String {
        "Constant".to_string()
    }

    fn connect(
        &self,
        trusted: &[Arc<Node>],
        attackers: &[Arc<Node>],
        link: &LinkParams,
        rng: &mut StdRng,
    ) -> Result<Latency, TopologyError> {
        let latency = link.latency_dist()?;

        let mut max = 0;
        for attacker in attackers {
            for node in trusted {
                let sample = latency.sample(rng);
                link_both_ways(attacker, node, sample);
                max = max.max(sample);
            }
        }

        Ok(max)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::ConstantConnection;
    use crate::peers::{test_utils, ConnectionStrategy};

    #[test]
    fn links_only_across_sub_networks() {
        let trusted = test_utils::nodes(0, 3);
        let attackers = test_utils::nodes(3, 2);
        let mut rng = StdRng::seed_from_u64(1);

        ConstantConnection
            .connect(&trusted, &attackers, &test_utils::link(10.0, 1.0), &mut rng)
            .unwrap();

        for node in &trusted {
            assert!(node.peers().iter().all(|peer| peer.node.get() >= 3));
            assert_eq!(node.peers().len(), 2);
        }
        for node in &attackers {
            assert!(node.peers().iter().all(|peer| peer.node.get() < 3));
            assert_eq!(node.peers().len(), 3);
        }
    }
}
