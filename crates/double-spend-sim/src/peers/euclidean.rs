//! Latency proportional to distance on a plane

use std::sync::Arc;

use rand::{rngs::StdRng, Rng};

use crate::{
    graph::{Latency, LatencyDist, TopologyError},
    node::Node,
    params::LinkParams,
    peers::{link_both_ways, PeerStrategy},
};

/// Places nodes uniformly at random on integer points of a square whose side
/// is the configured mean latency. Every pair is linked both ways, with a
/// latency sampled around the distance between the two points.
#[derive(Debug, Default, Clone, Copy)]
pub struct Euclidean;

impl PeerStrategy for Euclidean {
    fn name(&self) -> String {
        "Euclidean".to_string()
    }

    fn connect_peers(
        &self,
        nodes: &[Arc<Node>],
        link: &LinkParams,
        rng: &mut StdRng,
    ) -> Result<Latency, TopologyError> {
        // Fails early on a negative or non-finite mean
        link.latency_dist()?;

        let side = link.latency.round() as u64;
        let points: Vec<(f64, f64)> = nodes
            .iter()
            .map(|_| {
                let x = rng.gen_range(0..=side);
                let y = rng.gen_range(0..=side);
                (x as f64, y as f64)
            })
            .collect();

        let mut max = 0;
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let (dx, dy) = (points[i].0 - points[j].0, points[i].1 - points[j].1);
                let distance = dx.hypot(dy);
                let latency =
                    LatencyDist::with_deviation_factor(distance, link.deviation_factor)?
                        .sample(rng);

                link_both_ways(&nodes[i], &nodes[j], latency);
                max = max.max(latency);
            }
        }

        Ok(max)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::Euclidean;
    use crate::peers::{test_utils, PeerStrategy};

    #[test]
    fn latencies_stay_near_the_square() {
        let nodes = test_utils::nodes(0, 6);
        let mut rng = StdRng::seed_from_u64(9);
        let mut link = test_utils::link(40.0, 0.0);
        link.deviation_factor = 0.0;

        let max = Euclidean.connect_peers(&nodes, &link, &mut rng).unwrap();

        // Without deviation no latency exceeds the diagonal
        assert!(max as f64 <= 40.0 * 2f64.sqrt());
        assert!(nodes.iter().all(|node| node.peers().len() == 5));
    }
}
