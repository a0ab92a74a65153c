//! Building networks from parameters and running rounds on them

use std::sync::Arc;

use log::{debug, info};
use rand::{rngs::StdRng, SeedableRng};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::{
    graph::TopologyError,
    miner::{attacker::Attacker, honest::Honest, trusted::Trusted},
    network::{Network, NetworkError, StopSignal},
    node::{Node, NodeId},
    outcome::OutcomeManager,
    params::{Parameters, ParametersError, RoundParams},
    results::{DoubleSpendResults, StaleBlockResults, StaleTally, Tally},
    stale::StaleBlockManager,
};

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("a double-spend simulation needs at least one attacker node")]
    NoAttackers,
    #[error("invalid parameters")]
    Parameters(#[from] ParametersError),
    #[error("invalid topology")]
    Topology(#[from] TopologyError),
    #[error("network failure")]
    Network(#[from] NetworkError),
}

fn seeded_rng(params: &Parameters) -> StdRng {
    match params.seed() {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Repeated double-spend rounds over one network of trusted and attacker
/// nodes.
///
/// Nodes `0..trusted_nodes` are trusted, the remaining nodes are attackers.
#[derive(Debug)]
pub struct DoubleSpendSimulation {
    params: Parameters,
    rng: StdRng,
    network: Network,
    manager: Arc<OutcomeManager>,
    tally: Arc<Tally>,
    peers_created: bool,
}

impl DoubleSpendSimulation {
    pub fn new(params: Parameters) -> Result<Self, SimulationError> {
        if params.attacker_nodes() == 0 {
            return Err(SimulationError::NoAttackers);
        }

        let stop = Arc::new(StopSignal::default());
        let tally = Arc::new(Tally::default());
        let manager = Arc::new(OutcomeManager::new(
            params.thresholds(),
            Arc::clone(&stop),
            tally.clone(),
        ));

        let trusted = (0..params.trusted_nodes()).map(|i| {
            let behavior = Trusted::new(Arc::clone(&manager));
            Node::new(NodeId(i), format!("Trusted {i}"), params.difficulty(), Box::new(behavior))
        });
        let attackers = (0..params.attacker_nodes()).map(|i| {
            let behavior = Attacker::new(Arc::clone(&manager));
            let id = NodeId(params.trusted_nodes() + i);
            Node::new(id, format!("Attacker {i}"), params.difficulty(), Box::new(behavior))
        });
        let nodes = trusted.chain(attackers).collect();
        let network = Network::new(nodes, stop, params.delivery_workers())?;

        debug!(
            "double-spend simulation: {}, max lead {:?}, max length {}",
            params,
            params.max_lead(),
            params.max_length()
        );

        Ok(Self {
            rng: seeded_rng(&params),
            params,
            network,
            manager,
            tally,
            peers_created: false,
        })
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Rounds completed so far.
    pub fn rounds(&self) -> u64 {
        self.tally.rounds()
    }

    /// Replaces every peer link with a topology built for `round`.
    pub fn create_peers(
        &mut self,
        round: &RoundParams,
    ) -> Result<(), SimulationError> {
        self.network.clear_peers();

        let (trusted, attackers) =
            self.network.nodes().split_at(self.params.trusted_nodes());
        let trusted_max = self.params.trusted_strategy().connect_peers(
            trusted,
            &round.trusted,
            &mut self.rng,
        )?;
        let attacker_max = self.params.attacker_strategy().connect_peers(
            attackers,
            &round.attacker,
            &mut self.rng,
        )?;
        let connection_max = self.params.connection_strategy().connect(
            trusted,
            attackers,
            &round.connection,
            &mut self.rng,
        )?;

        let max_latency = trusted_max.max(attacker_max).max(connection_max);
        debug!("peers created, max latency {} ms", max_latency);
        self.network.set_max_latency(max_latency);
        self.peers_created = true;

        Ok(())
    }

    /// Runs a single round and blocks until its outcome is reported.
    pub fn run_round(&mut self) -> Result<(), SimulationError> {
        let round = self.params.draw(&mut self.rng);
        if !self.peers_created || self.params.reset_peers() {
            self.create_peers(&round)?;
        }

        self.manager.begin_round(round.confirmations);
        self.network.run_round(&mut self.rng)?;

        Ok(())
    }

    /// Runs all configured rounds.
    pub fn run(mut self) -> Result<DoubleSpendResults, SimulationError> {
        for run in 1..=self.params.runs() {
            self.run_round()?;
            debug!("round {} of {} done", run, self.params.runs());
        }

        let results = self.results();
        info!("{}", results);
        Ok(results)
    }

    /// Totals of the rounds completed so far.
    pub fn results(&self) -> DoubleSpendResults {
        self.tally.results(&self.params)
    }
}

/// Repeated rounds of a network of honest nodes, measuring how many mined
/// blocks end up stale.
///
/// Every node, trusted or attacker in `params`, mines honestly. The network
/// is wired with the trusted strategy and link parameters.
#[derive(Debug)]
pub struct StaleBlockSimulation {
    params: Parameters,
    rng: StdRng,
    network: Network,
    manager: Arc<StaleBlockManager>,
    tally: Arc<StaleTally>,
    peers_created: bool,
}

impl StaleBlockSimulation {
    pub fn new(params: Parameters) -> Result<Self, SimulationError> {
        let stop = Arc::new(StopSignal::default());
        let tally = Arc::new(StaleTally::default());
        let manager = Arc::new(StaleBlockManager::new(
            params.max_length(),
            Arc::clone(&stop),
            tally.clone(),
        ));

        let count = params.trusted_nodes() + params.attacker_nodes();
        let nodes = (0..count)
            .map(|i| {
                let behavior = Honest::new(Arc::clone(&manager));
                Node::new(NodeId(i), format!("Node {i}"), params.difficulty(), Box::new(behavior))
            })
            .collect();
        let network = Network::new(nodes, stop, params.delivery_workers())?;

        Ok(Self {
            rng: seeded_rng(&params),
            params,
            network,
            manager,
            tally,
            peers_created: false,
        })
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn create_peers(
        &mut self,
        round: &RoundParams,
    ) -> Result<(), SimulationError> {
        self.network.clear_peers();

        let max_latency = self.params.trusted_strategy().connect_peers(
            self.network.nodes(),
            &round.trusted,
            &mut self.rng,
        )?;
        self.network.set_max_latency(max_latency);
        self.peers_created = true;

        Ok(())
    }

    pub fn run_round(&mut self) -> Result<(), SimulationError> {
        let round = self.params.draw(&mut self.rng);
        if !self.peers_created || self.params.reset_peers() {
            self.create_peers(&round)?;
        }

        self.manager.begin_round();
        self.network.run_round(&mut self.rng)?;

        Ok(())
    }

    pub fn run(mut self) -> Result<StaleBlockResults, SimulationError> {
        for _ in 0..self.params.runs() {
            self.run_round()?;
        }

        let results = self.results();
        info!("{}", results);
        Ok(results)
    }

    pub fn results(&self) -> StaleBlockResults {
        self.tally.results(&self.params)
    }
}

/// Container for a group of independent double-spend simulations.
/// Simulations should be run using this struct's `run_all` method.
#[derive(Debug, Clone, Default)]
pub struct SimulationGroup {
    params: Vec<Parameters>,
}

impl SimulationGroup {
    pub fn new(params: Vec<Parameters>) -> Self {
        Self { params }
    }

    pub fn add(&mut self, params: Parameters) {
        self.params.push(params);
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Runs every simulation to completion. Results are returned in the order
    /// the parameters were added.
    pub fn run_all(self) -> Result<Vec<DoubleSpendResults>, SimulationError> {
        #[cfg(feature = "rayon")]
        let params = self.params.into_par_iter();
        #[cfg(not(feature = "rayon"))]
        let params = self.params.into_iter();

        params
            .map(|params| DoubleSpendSimulation::new(params)?.run())
            .collect()
    }
}
