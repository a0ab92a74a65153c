//! Running one synchronized mining round over a set of nodes

use std::{
    io, panic,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    graph::Latency,
    node::{Node, NodeId},
    scheduler::{DeliveryScheduler, SchedulerHandle},
    sync::RoundBarrier,
};

/// Cross-thread flag which ends a round.
#[derive(Debug, Default)]
pub struct StopSignal(AtomicBool);

impl StopSignal {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("could not start a node or delivery thread")]
    Spawn(#[from] io::Error),
    #[error("a network needs at least one node")]
    NoNodes,
}

/// Everything a mining thread shares with the rest of its round.
#[derive(Clone)]
pub(crate) struct Round {
    pub nodes: Arc<[Arc<Node>]>,
    pub barrier: Arc<RoundBarrier>,
    pub deliveries: SchedulerHandle,
    pub stop: Arc<StopSignal>,
}

/// Owns the nodes of a simulation and runs rounds on them.
#[derive(Debug)]
pub struct Network {
    nodes: Arc<[Arc<Node>]>,
    stop: Arc<StopSignal>,
    max_latency: Latency,
    delivery_workers: usize,
}

impl Network {
    /// Lower bound on how long in-flight deliveries may drain after a round.
    pub const MIN_TEARDOWN_GRACE: Duration = Duration::from_millis(200);

    /// Creates a network of `nodes`, whose rounds end when `stop` is raised.
    ///
    /// ## Panics
    /// Panics if a node's ID differs from its position in `nodes`.
    pub fn new(
        nodes: Vec<Node>,
        stop: Arc<StopSignal>,
        delivery_workers: usize,
    ) -> Result<Self, NetworkError> {
        if nodes.is_empty() {
            return Err(NetworkError::NoNodes);
        }
        for (i, node) in nodes.iter().enumerate() {
            assert_eq!(node.id(), NodeId(i), "node IDs must match positions");
        }

        Ok(Self {
            nodes: nodes.into_iter().map(Arc::new).collect(),
            stop,
            max_latency: 0,
            delivery_workers,
        })
    }

    #[inline]
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<Node>> {
        self.nodes.get(id.get())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stop_signal(&self) -> &Arc<StopSignal> {
        &self.stop
    }

    /// Largest latency between two peers of the current topology.
    #[inline]
    pub fn max_latency(&self) -> Latency {
        self.max_latency
    }

    pub fn set_max_latency(&mut self, latency: Latency) {
        self.max_latency = latency;
    }

    /// Time in-flight deliveries get to drain once all nodes stopped.
    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.max_latency).max(Self::MIN_TEARDOWN_GRACE)
    }

    /// Removes every peer link.
    pub fn clear_peers(&self) {
        for node in self.nodes.iter() {
            node.clear_peers();
        }
    }

    /// Runs one round and blocks until every node stopped mining.
    ///
    /// A round ends when the stop signal is raised. Each node thread gets
    /// its own RNG seeded from `rng`. A panic in a node thread or in a
    /// delivery ends the round and is resumed here once the round has been
    /// torn down.
    pub fn run_round(&self, rng: &mut StdRng) -> Result<(), NetworkError> {
        self.stop.reset();
        for node in self.nodes.iter() {
            node.reset();
        }

        let barrier = Arc::new(RoundBarrier::new(self.nodes.len()));
        let scheduler = {
            let stop = Arc::clone(&self.stop);
            let barrier = Arc::clone(&barrier);
            DeliveryScheduler::with_panic_hook(self.delivery_workers, move || {
                stop.stop();
                barrier.cancel();
            })?
        };
        let round = Round {
            nodes: Arc::clone(&self.nodes),
            barrier,
            deliveries: scheduler.handle(),
            stop: Arc::clone(&self.stop),
        };

        let mut handles = Vec::with_capacity(self.nodes.len());
        let mut spawn_error = None;
        for node in self.nodes.iter() {
            let node = Arc::clone(node);
            let round = round.clone();
            let mut node_rng = StdRng::seed_from_u64(rng.gen());

            let spawned = thread::Builder::new()
                .name(node.name().to_string())
                .spawn(move || node.mine(&round, &mut node_rng));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    spawn_error = Some(err);
                    break;
                }
            }
        }

        if spawn_error.is_some() {
            self.stop.stop();
            round.barrier.cancel();
        }

        let mut node_panic = None;
        for handle in handles {
            if let Err(payload) = handle.join() {
                node_panic.get_or_insert(payload);
            }
        }

        let teardown = scheduler.shutdown(self.teardown_grace());
        debug!("round torn down, {} deliveries dropped", teardown.dropped);

        if let Some(payload) = node_panic.or(teardown.panic) {
            panic::resume_unwind(payload);
        }
        match spawn_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        time::Duration,
    };

    use rand::{rngs::StdRng, SeedableRng};

    use super::{Network, StopSignal};
    use crate::{
        blockchain::{Blockchain, Tag},
        miner::NodeBehavior,
        node::{Node, NodeId, Peer, TICKS_PER_SYNC},
    };

    /// Stops the round once any node mined `target` blocks.
    #[derive(Debug)]
    struct StopAt {
        target: u64,
        mined: Arc<AtomicU64>,
        stop: Arc<StopSignal>,
    }

    impl NodeBehavior for StopAt {
        fn name(&self) -> String {
            "StopAt".to_string()
        }

        fn initial_tag(&self) -> Option<Tag> {
            None
        }

        fn on_block_mined(&self, _node: NodeId, chain: &Blockchain) {
            self.mined.fetch_add(1, Ordering::SeqCst);
            if chain.length() >= self.target {
                self.stop.stop();
            }
        }
    }

    fn network(difficulties: &[f64], target: u64) -> (Network, Arc<AtomicU64>) {
        let stop = Arc::new(StopSignal::default());
        let mined = Arc::new(AtomicU64::new(0));
        let nodes = difficulties
            .iter()
            .enumerate()
            .map(|(i, &difficulty)| {
                let behavior = StopAt {
                    target,
                    mined: Arc::clone(&mined),
                    stop: Arc::clone(&stop),
                };
                Node::new(NodeId(i), format!("Node {i}"), difficulty, Box::new(behavior))
            })
            .collect();

        (Network::new(nodes, stop, 2).unwrap(), mined)
    }

    #[test]
    fn round_ends_when_stop_is_raised() {
        let (network, mined) = network(&[0.2; 4], 5);
        let mut rng = StdRng::seed_from_u64(11);

        network.run_round(&mut rng).unwrap();

        assert!(network.stop_signal().is_stopped());
        assert!(mined.load(Ordering::SeqCst) >= 5);
        assert!(network.nodes().iter().any(|node| node.chain().length() >= 5));
    }

    #[test]
    fn blocks_reach_peers() {
        // Node 1 never mines, so everything it has came from node 0.
        let (network, _) = network(&[0.2, 0.0], 8);
        network.nodes()[0].add_peer(Peer { node: NodeId(1), latency: 5 });
        let mut rng = StdRng::seed_from_u64(3);

        network.run_round(&mut rng).unwrap();

        let miner = network.nodes()[0].chain().length();
        assert!(miner >= 8);
        assert_eq!(network.nodes()[1].chain().length(), miner);
    }

    #[test]
    fn rounds_start_from_empty_chains() {
        let (network, _) = network(&[0.2; 3], 2);
        let mut rng = StdRng::seed_from_u64(5);

        network.run_round(&mut rng).unwrap();
        network.run_round(&mut rng).unwrap();

        for node in network.nodes() {
            assert!(node.chain().length() <= 1 + TICKS_PER_SYNC as u64);
        }
    }

    /// Refuses every delivered chain by panicking.
    #[derive(Debug)]
    struct Corrupt;

    impl NodeBehavior for Corrupt {
        fn name(&self) -> String {
            "Corrupt".to_string()
        }

        fn initial_tag(&self) -> Option<Tag> {
            None
        }

        fn on_choice(&self, _node: NodeId, _old: &Blockchain, _new: &Blockchain) {
            panic!("corrupt delivery");
        }

        fn on_block_mined(&self, _node: NodeId, _chain: &Blockchain) {}
    }

    #[test]
    #[should_panic(expected = "corrupt delivery")]
    fn delivery_panic_ends_round_and_reaches_caller() {
        // Without the panic the miner would run until 1000 blocks.
        let stop = Arc::new(StopSignal::default());
        let miner = StopAt {
            target: 1000,
            mined: Arc::default(),
            stop: Arc::clone(&stop),
        };
        let nodes = vec![
            Node::new(NodeId(0), "Miner", 0.5, Box::new(miner)),
            Node::new(NodeId(1), "Receiver", 0.0, Box::new(Corrupt)),
        ];
        let network = Network::new(nodes, stop, 1).unwrap();
        network.nodes()[0].add_peer(Peer { node: NodeId(1), latency: 0 });
        let mut rng = StdRng::seed_from_u64(9);

        let _ = network.run_round(&mut rng);
    }

    #[test]
    fn teardown_grace_has_a_floor() {
        let (mut network, _) = network(&[0.5], 1);
        assert_eq!(network.teardown_grace(), Network::MIN_TEARDOWN_GRACE);

        network.set_max_latency(750);
        assert_eq!(network.teardown_grace(), Duration::from_millis(750));
    }

    #[test]
    #[should_panic(expected = "node IDs must match positions")]
    fn node_ids_must_match_positions() {
        let stop = Arc::new(StopSignal::default());
        let behavior = StopAt {
            target: 1,
            mined: Arc::default(),
            stop: Arc::clone(&stop),
        };
        let node = Node::new(NodeId(3), "Misplaced", 0.5, Box::new(behavior));

        let _ = Network::new(vec![node], stop, 1);
    }
}
