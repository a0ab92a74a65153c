//! Simulated mining nodes
//!
//! A [`Node`] owns one chain and mines on it from a dedicated thread for the
//! duration of a round. Mining is modelled as batches of independent
//! Bernoulli trials separated by a shared [`RoundBarrier`], so every node
//! performs the same number of attempts between two synchronization points.
//! Blocks found by a node are delivered to each of its peers after that
//! peer's latency, and each delivery goes through the longest-chain rule of
//! the receiving node.
//!
//! Role-specific behavior (which chains to refuse, what to report) is
//! injected through the [`NodeBehavior`] trait.

use std::{fmt::Display, mem, sync::Arc, time::Duration};

use log::{debug, trace};
use parking_lot::{Mutex, RwLock};
use rand::{rngs::StdRng, Rng};

use crate::{
    blockchain::Blockchain, graph::Latency, miner::NodeBehavior,
    network::Round, sync::RoundBarrier,
};

/// Number of mining attempts a node makes between two barrier waits.
pub const TICKS_PER_SYNC: usize = 10;

/// Identifier of a [`Node`]. Equal to the node's index in its network.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Returns the [`usize`] corresponding to this [`NodeId`].
    pub fn get(&self) -> usize {
        self.0
    }
}

impl From<usize> for NodeId {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Directed link to another node. `latency` is in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub node: NodeId,
    pub latency: Latency,
}

/// A participant of the mining network.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    name: String,
    difficulty: f64,
    behavior: Box<dyn NodeBehavior>,
    peers: RwLock<Vec<Peer>>,
    chain: Mutex<Blockchain>,
}

impl Node {
    /// Creates a node with an empty chain and no peers.
    ///
    /// ## Panics
    /// Panics if `difficulty` is not a probability.
    pub fn new<S>(
        id: NodeId,
        name: S,
        difficulty: f64,
        behavior: Box<dyn NodeBehavior>,
    ) -> Self
    where
        S: Into<String>,
    {
        assert!(
            (0.0..=1.0).contains(&difficulty),
            "difficulty {difficulty} is not a probability"
        );

        let chain = Blockchain::new(difficulty, behavior.initial_tag());
        Self {
            id,
            name: name.into(),
            difficulty,
            behavior,
            peers: RwLock::new(vec![]),
            chain: Mutex::new(chain),
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    pub fn behavior(&self) -> &dyn NodeBehavior {
        self.behavior.as_ref()
    }

    pub fn add_peer(&self, peer: Peer) {
        self.peers.write().push(peer);
    }

    pub fn clear_peers(&self) {
        self.peers.write().clear();
    }

    /// Snapshot of this node's peer list.
    pub fn peers(&self) -> Vec<Peer> {
        self.peers.read().clone()
    }

    /// Snapshot of the chain this node is currently mining on.
    pub fn chain(&self) -> Blockchain {
        self.chain.lock().clone()
    }

    /// Replaces the local chain with an empty chain carrying this node's
    /// initial tag.
    pub fn reset(&self) {
        *self.chain.lock() =
            Blockchain::new(self.difficulty, self.behavior.initial_tag());
    }

    /// Applies the longest-chain rule to a chain delivered by `sender`.
    /// Returns true iff the local chain was replaced.
    pub fn receive(&self, chain: Blockchain, sender: NodeId) -> bool {
        let mut local = self.chain.lock();

        if self.behavior.ignore_chain(&local, &chain, sender) {
            trace!("{} ignored {} from node {}", self.name, chain, sender);
            return false;
        }

        if chain.is_better_than(&local) {
            let old = mem::replace(&mut *local, chain);
            assert!(
                local.length() > old.length(),
                "chain of {} regressed from {} to {}",
                self.name,
                old,
                *local
            );
            trace!("{} accepted {} from node {}", self.name, *local, sender);

            self.behavior.on_choice(self.id, &old, &local);
            true
        } else {
            trace!("{} declined {} from node {}", self.name, chain, sender);

            self.behavior.on_choice(self.id, &local, &local);
            false
        }
    }

    /// Extends the local chain and schedules a copy of it for every peer.
    fn block_found(&self, round: &Round) {
        let mut chain = self.chain.lock();
        chain.extend();
        debug!("{} found block {}", self.name, *chain);

        for peer in self.peers.read().iter() {
            let target = match round.nodes.get(peer.node.get()) {
                Some(node) => Arc::clone(node),
                None => continue,
            };
            let copy = chain.clone();
            let sender = self.id;
            round.deliveries.schedule(
                Duration::from_millis(peer.latency),
                move || {
                    target.receive(copy, sender);
                },
            );
        }

        self.behavior.on_block_mined(self.id, &chain);
    }

    /// Mining loop of one round. Returns once the round's stop signal is
    /// observed or the barrier is cancelled by another node.
    pub(crate) fn mine(&self, round: &Round, rng: &mut StdRng) {
        let _release = ReleaseOnExit(&round.barrier);

        if round.barrier.wait().is_cancelled() {
            return;
        }

        while !round.stop.is_stopped() {
            for _ in 0..TICKS_PER_SYNC {
                if rng.gen_bool(self.difficulty) {
                    self.block_found(round);
                }
            }

            if round.barrier.wait().is_cancelled() {
                break;
            }
        }

        trace!("{} stopped mining", self.name);
    }
}

/// Cancels the barrier when a mining loop ends, including by panic, so that
/// no other node stays blocked on it.
struct ReleaseOnExit<'a>(&'a RoundBarrier);

impl Drop for ReleaseOnExit<'_> {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
