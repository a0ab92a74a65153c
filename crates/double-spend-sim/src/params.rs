/*!
Simulation parameters

A [`Parameters`] value is immutable once built and describes a whole
simulation: node populations, mining difficulty, topology and the limits used
to end rounds. Some parameters may be randomized per round. Those are
[`Parameter`] values, which are re-drawn by [`Parameters::draw`] into a
[`RoundParams`] snapshot at the start of each round.

# Examples
```
use double_spend_sim::prelude::*;

let params = Parameters::builder()
    .trusted_nodes(8)
    .attacker_nodes(4)
    .difficulty(0.001)
    .confirmations_between(2, 6)
    .runs(10)
    .build()
    .unwrap();

assert_eq!(params.max_lead(), Some(17));
```
*/

use std::fmt::Display;

use log::LevelFilter;
use rand::{distributions::uniform::SampleUniform, Rng};

use crate::{
    graph::{LatencyDist, TopologyError},
    outcome::{SuccessRule, Thresholds},
    peers::{ConnectionStrategy, ConstantConnection, PeerStrategy, RandomGraph},
    utils::log_base,
};

pub const DEFAULT_TRUSTED_NODES: usize = 32;
pub const DEFAULT_ATTACKER_NODES: usize = 16;
pub const DEFAULT_DIFFICULTY: f64 = 1e-5;
pub const DEFAULT_CONFIRMATIONS: u64 = 6;
/// Mean latency of every kind of link, in milliseconds.
pub const DEFAULT_LATENCY: f64 = 10.0;
pub const DEFAULT_DENSITY: f64 = 0.8;
pub const DEFAULT_DEVIATION_FACTOR: f64 = 0.1;
pub const DEFAULT_RUNS: usize = 100;
pub const DEFAULT_EPSILON: f64 = 1e-5;
pub const DEFAULT_DELIVERY_WORKERS: usize = 4;

/// A value which is either fixed or drawn uniformly from an inclusive range
/// at the start of every round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parameter<T> {
    Fixed(T),
    Uniform { lower: T, upper: T },
}

impl<T> From<T> for Parameter<T> {
    fn from(value: T) -> Self {
        Self::Fixed(value)
    }
}

impl<T> Parameter<T>
where
    T: SampleUniform + PartialOrd + Copy,
{
    /// Draws a value. Always returns the same value for
    /// [`Parameter::Fixed`].
    ///
    /// ## Panics
    /// Panics if the bounds of a [`Parameter::Uniform`] are out of order.
    pub fn next<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        match *self {
            Self::Fixed(value) => value,
            Self::Uniform { lower, upper } => rng.gen_range(lower..=upper),
        }
    }

    pub fn lower(&self) -> T {
        match *self {
            Self::Fixed(value) => value,
            Self::Uniform { lower, .. } => lower,
        }
    }

    pub fn upper(&self) -> T {
        match *self {
            Self::Fixed(value) => value,
            Self::Uniform { upper, .. } => upper,
        }
    }

    pub fn is_randomized(&self) -> bool {
        matches!(self, Self::Uniform { .. })
    }
}

impl<T: Display> Display for Parameter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(value) => write!(f, "{}", value),
            Self::Uniform { lower, upper } => write!(f, "{}..={}", lower, upper),
        }
    }
}

impl<T> Parameter<T>
where
    T: SampleUniform + PartialOrd + Copy + Display,
{
    fn check_order(&self, name: &'static str) -> Result<(), ParametersError> {
        if self.lower() > self.upper() {
            return Err(ParametersError::InvalidBounds {
                name,
                lower: self.lower().to_string(),
                upper: self.upper().to_string(),
            });
        }

        Ok(())
    }
}

impl Parameter<f64> {
    fn check_within(
        &self,
        name: &'static str,
        min: f64,
        max: f64,
    ) -> Result<(), ParametersError> {
        self.check_order(name)?;
        for value in [self.lower(), self.upper()] {
            if !(min..=max).contains(&value) {
                return Err(ParametersError::OutOfRange { name, value, min, max });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParametersError {
    #[error("at least one trusted node is required")]
    NoTrustedNodes,
    #[error("number of simulation runs must be greater than 0")]
    ZeroRuns,
    #[error("at least one delivery worker is required")]
    ZeroDeliveryWorkers,
    #[error("difficulty must lie in (0, 1), got {0}")]
    DifficultyOutOfRange(f64),
    #[error("epsilon must lie in (0, 1), got {0}")]
    EpsilonOutOfRange(f64),
    #[error("latency deviation factor must be a non-negative number, got {0}")]
    InvalidDeviation(f64),
    #[error("{name} must lie in [{min}, {max}], got {value}")]
    OutOfRange { name: &'static str, value: f64, min: f64, max: f64 },
    #[error("lower bound {lower} of {name} exceeds upper bound {upper}")]
    InvalidBounds { name: &'static str, lower: String, upper: String },
}

/// Largest trusted lead an attacker owning `attackers` of
/// `attackers + trusted` equally strong nodes can still be expected to
/// recover from, except with probability `epsilon`. `None` if the attacker
/// is at least as strong as the trusted network.
pub fn max_lead(attackers: usize, trusted: usize, epsilon: f64) -> Option<u64> {
    let p = attackers as f64 / trusted as f64;
    if p >= 1.0 {
        return None;
    }

    Some(log_base(p, epsilon).ceil().max(0.0) as u64)
}

/// Chain length after which a round is abandoned regardless of the lead.
pub fn max_length(epsilon: f64) -> u64 {
    (1.0 / (epsilon * 100.0)).ceil() as u64
}

/// Latency and density of one group of links, drawn for one round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkParams {
    /// Mean latency in milliseconds.
    pub latency: f64,
    /// Fraction of all possible links present in a random graph.
    pub density: f64,
    /// Latency standard deviation as a fraction of the mean.
    pub deviation_factor: f64,
}

impl LinkParams {
    pub fn latency_dist(&self) -> Result<LatencyDist, TopologyError> {
        LatencyDist::with_deviation_factor(self.latency, self.deviation_factor)
    }
}

/// Parameter values of a single round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundParams {
    pub confirmations: u64,
    pub trusted: LinkParams,
    pub attacker: LinkParams,
    pub connection: LinkParams,
}

/// Complete, validated configuration of a simulation.
#[derive(Debug, Clone)]
pub struct Parameters {
    trusted_nodes: usize,
    attacker_nodes: usize,
    difficulty: f64,
    confirmations: Parameter<u64>,
    trusted_latency: Parameter<f64>,
    attacker_latency: Parameter<f64>,
    connection_latency: Parameter<f64>,
    trusted_density: Parameter<f64>,
    attacker_density: Parameter<f64>,
    deviation_factor: f64,
    runs: usize,
    epsilon: f64,
    log_level: LevelFilter,
    success_rule: SuccessRule,
    reset_peers: bool,
    seed: Option<u64>,
    delivery_workers: usize,
    trusted_strategy: Box<dyn PeerStrategy>,
    attacker_strategy: Box<dyn PeerStrategy>,
    connection_strategy: Box<dyn ConnectionStrategy>,
}

impl Parameters {
    pub fn builder() -> ParametersBuilder {
        ParametersBuilder::new()
    }

    pub fn trusted_nodes(&self) -> usize {
        self.trusted_nodes
    }

    pub fn attacker_nodes(&self) -> usize {
        self.attacker_nodes
    }

    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    pub fn confirmations(&self) -> Parameter<u64> {
        self.confirmations
    }

    pub fn trusted_latency(&self) -> Parameter<f64> {
        self.trusted_latency
    }

    pub fn attacker_latency(&self) -> Parameter<f64> {
        self.attacker_latency
    }

    pub fn connection_latency(&self) -> Parameter<f64> {
        self.connection_latency
    }

    pub fn trusted_density(&self) -> Parameter<f64> {
        self.trusted_density
    }

    pub fn attacker_density(&self) -> Parameter<f64> {
        self.attacker_density
    }

    pub fn deviation_factor(&self) -> f64 {
        self.deviation_factor
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn success_rule(&self) -> SuccessRule {
        self.success_rule
    }

    /// Whether the topology is rebuilt before every round.
    pub fn reset_peers(&self) -> bool {
        self.reset_peers
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn delivery_workers(&self) -> usize {
        self.delivery_workers
    }

    pub fn trusted_strategy(&self) -> &dyn PeerStrategy {
        self.trusted_strategy.as_ref()
    }

    pub fn attacker_strategy(&self) -> &dyn PeerStrategy {
        self.attacker_strategy.as_ref()
    }

    pub fn connection_strategy(&self) -> &dyn ConnectionStrategy {
        self.connection_strategy.as_ref()
    }

    pub fn max_lead(&self) -> Option<u64> {
        max_lead(self.attacker_nodes, self.trusted_nodes, self.epsilon)
    }

    pub fn max_length(&self) -> u64 {
        max_length(self.epsilon)
    }

    /// Limits of a double-spend round under these parameters.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            max_lead: self.max_lead(),
            max_length: self.max_length(),
            trusted_nodes: self.trusted_nodes as u64,
            rule: self.success_rule,
        }
    }

    /// Draws the values of all randomized parameters for one round.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> RoundParams {
        let deviation_factor = self.deviation_factor;

        RoundParams {
            confirmations: self.confirmations.next(rng),
            trusted: LinkParams {
                latency: self.trusted_latency.next(rng),
                density: self.trusted_density.next(rng),
                deviation_factor,
            },
            attacker: LinkParams {
                latency: self.attacker_latency.next(rng),
                density: self.attacker_density.next(rng),
                deviation_factor,
            },
            connection: LinkParams {
                latency: self.connection_latency.next(rng),
                density: 1.0,
                deviation_factor,
            },
        }
    }
}

impl Display for Parameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} trusted, {} attackers, difficulty {}, {} confirmations, \
             epsilon {}, {} runs",
            self.trusted_nodes,
            self.attacker_nodes,
            self.difficulty,
            self.confirmations,
            self.epsilon,
            self.runs
        )
    }
}

/// Builds [`Parameters`]. Every value not set explicitly keeps its default.
#[derive(Debug, Clone)]
pub struct ParametersBuilder {
    trusted_nodes: usize,
    attacker_nodes: usize,
    difficulty: f64,
    confirmations: Parameter<u64>,
    trusted_latency: Parameter<f64>,
    attacker_latency: Parameter<f64>,
    connection_latency: Parameter<f64>,
    trusted_density: Parameter<f64>,
    attacker_density: Parameter<f64>,
    deviation_factor: f64,
    runs: usize,
    epsilon: f64,
    log_level: LevelFilter,
    success_rule: SuccessRule,
    reset_peers: bool,
    seed: Option<u64>,
    delivery_workers: usize,
    trusted_strategy: Box<dyn PeerStrategy>,
    attacker_strategy: Box<dyn PeerStrategy>,
    connection_strategy: Box<dyn ConnectionStrategy>,
}

impl Default for ParametersBuilder {
    fn default() -> Self {
        Self {
            trusted_nodes: DEFAULT_TRUSTED_NODES,
            attacker_nodes: DEFAULT_ATTACKER_NODES,
            difficulty: DEFAULT_DIFFICULTY,
            confirmations: Parameter::Fixed(DEFAULT_CONFIRMATIONS),
            trusted_latency: Parameter::Fixed(DEFAULT_LATENCY),
            attacker_latency: Parameter::Fixed(DEFAULT_LATENCY),
            connection_latency: Parameter::Fixed(DEFAULT_LATENCY),
            trusted_density: Parameter::Fixed(DEFAULT_DENSITY),
            attacker_density: Parameter::Fixed(DEFAULT_DENSITY),
            deviation_factor: DEFAULT_DEVIATION_FACTOR,
            runs: DEFAULT_RUNS,
            epsilon: DEFAULT_EPSILON,
            log_level: LevelFilter::Info,
            success_rule: SuccessRule::default(),
            reset_peers: false,
            seed: None,
            delivery_workers: DEFAULT_DELIVERY_WORKERS,
            trusted_strategy: Box::new(RandomGraph),
            attacker_strategy: Box::new(RandomGraph),
            connection_strategy: Box::new(ConstantConnection),
        }
    }
}

impl ParametersBuilder {
    /// Creates a new [`ParametersBuilder`] holding the default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trusted_nodes(mut self, count: usize) -> Self {
        self.trusted_nodes = count;

        self
    }

    pub fn attacker_nodes(mut self, count: usize) -> Self {
        self.attacker_nodes = count;

        self
    }

    /// Probability that one mining tick of one node finds a block.
    pub fn difficulty(mut self, difficulty: f64) -> Self {
        self.difficulty = difficulty;

        self
    }

    pub fn confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = Parameter::Fixed(confirmations);

        self
    }

    /// Draw the required confirmations uniformly from `lower..=upper` every
    /// round.
    pub fn confirmations_between(mut self, lower: u64, upper: u64) -> Self {
        self.confirmations = Parameter::Uniform { lower, upper };

        self
    }

    pub fn trusted_latency(mut self, mean: f64) -> Self {
        self.trusted_latency = Parameter::Fixed(mean);

        self
    }

    pub fn trusted_latency_between(mut self, lower: f64, upper: f64) -> Self {
        self.trusted_latency = Parameter::Uniform { lower, upper };

        self
    }

    pub fn attacker_latency(mut self, mean: f64) -> Self {
        self.attacker_latency = Parameter::Fixed(mean);

        self
    }

    pub fn attacker_latency_between(mut self, lower: f64, upper: f64) -> Self {
        self.attacker_latency = Parameter::Uniform { lower, upper };

        self
    }

    /// Mean latency of links between trusted and attacker nodes.
    pub fn connection_latency(mut self, mean: f64) -> Self {
        self.connection_latency = Parameter::Fixed(mean);

        self
    }

    pub fn connection_latency_between(mut self, lower: f64, upper: f64) -> Self {
        self.connection_latency = Parameter::Uniform { lower, upper };

        self
    }

    /// Sets every latency mean at once.
    pub fn latency(self, mean: f64) -> Self {
        self.trusted_latency(mean)
            .attacker_latency(mean)
            .connection_latency(mean)
    }

    pub fn trusted_density(mut self, density: f64) -> Self {
        self.trusted_density = Parameter::Fixed(density);

        self
    }

    pub fn trusted_density_between(mut self, lower: f64, upper: f64) -> Self {
        self.trusted_density = Parameter::Uniform { lower, upper };

        self
    }

    pub fn attacker_density(mut self, density: f64) -> Self {
        self.attacker_density = Parameter::Fixed(density);

        self
    }

    pub fn attacker_density_between(mut self, lower: f64, upper: f64) -> Self {
        self.attacker_density = Parameter::Uniform { lower, upper };

        self
    }

    /// Standard deviation of sampled latencies, as a fraction of their mean.
    pub fn deviation_factor(mut self, factor: f64) -> Self {
        self.deviation_factor = factor;

        self
    }

    pub fn runs(mut self, runs: usize) -> Self {
        self.runs = runs;

        self
    }

    /// Acceptable probability of ending a round too early.
    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;

        self
    }

    pub fn log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;

        self
    }

    pub fn success_rule(mut self, rule: SuccessRule) -> Self {
        self.success_rule = rule;

        self
    }

    /// Rebuild the topology before every round instead of only the first.
    pub fn reset_peers(mut self, reset: bool) -> Self {
        self.reset_peers = reset;

        self
    }

    /// Seed of the simulation RNG. Seeded from entropy if unset.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);

        self
    }

    pub fn delivery_workers(mut self, workers: usize) -> Self {
        self.delivery_workers = workers;

        self
    }

    pub fn trusted_strategy<S: PeerStrategy + 'static>(mut self, strategy: S) -> Self {
        self.trusted_strategy = Box::new(strategy);

        self
    }

    pub fn attacker_strategy<S: PeerStrategy + 'static>(mut self, strategy: S) -> Self {
        self.attacker_strategy = Box::new(strategy);

        self
    }

    pub fn connection_strategy<S>(mut self, strategy: S) -> Self
    where
        S: ConnectionStrategy + 'static,
    {
        self.connection_strategy = Box::new(strategy);

        self
    }

    /// Validates the configured values and creates [`Parameters`].
    pub fn build(self) -> Result<Parameters, ParametersError> {
        use ParametersError::*;

        let open_unit = |value: f64| value > 0.0 && value < 1.0;

        if self.trusted_nodes == 0 {
            return Err(NoTrustedNodes);
        }
        if self.runs == 0 {
            return Err(ZeroRuns);
        }
        if self.delivery_workers == 0 {
            return Err(ZeroDeliveryWorkers);
        }
        if !open_unit(self.difficulty) {
            return Err(DifficultyOutOfRange(self.difficulty));
        }
        if !open_unit(self.epsilon) {
            return Err(EpsilonOutOfRange(self.epsilon));
        }
        if !self.deviation_factor.is_finite() || self.deviation_factor < 0.0 {
            return Err(InvalidDeviation(self.deviation_factor));
        }

        self.confirmations.check_order("confirmations")?;
        self.trusted_latency
            .check_within("trusted latency", 0.0, f64::MAX)?;
        self.attacker_latency
            .check_within("attacker latency", 0.0, f64::MAX)?;
        self.connection_latency
            .check_within("connection latency", 0.0, f64::MAX)?;
        self.trusted_density.check_within("trusted density", 0.0, 1.0)?;
        self.attacker_density
            .check_within("attacker density", 0.0, 1.0)?;

        let ParametersBuilder {
            trusted_nodes,
            attacker_nodes,
            difficulty,
            confirmations,
            trusted_latency,
            attacker_latency,
            connection_latency,
            trusted_density,
            attacker_density,
            deviation_factor,
            runs,
            epsilon,
            log_level,
            success_rule,
            reset_peers,
            seed,
            delivery_workers,
            trusted_strategy,
            attacker_strategy,
            connection_strategy,
        } = self;

        Ok(Parameters {
            trusted_nodes,
            attacker_nodes,
            difficulty,
            confirmations,
            trusted_latency,
            attacker_latency,
            connection_latency,
            trusted_density,
            attacker_density,
            deviation_factor,
            runs,
            epsilon,
            log_level,
            success_rule,
            reset_peers,
            seed,
            delivery_workers,
            trusted_strategy,
            attacker_strategy,
            connection_strategy,
        })
    }
}
