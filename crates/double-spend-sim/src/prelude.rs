/*!
Re-export of common values and datatypes used for running and analyzing
simulations. Must be imported manually.

```
use double_spend_sim::prelude::*;
```
*/

use crate::{
    blockchain, graph, miner, network, node, outcome, params, peers, results,
    simulation, stale,
};

pub use blockchain::{Blockchain, Tag};

pub use graph::{DistanceMatrix, Graph, Latency, LatencyDist, TopologyError};

pub use miner::{
    attacker::Attacker, honest::Honest, trusted::Trusted, NodeBehavior,
};

pub use network::{Network, NetworkError, StopSignal};

pub use node::{Node, NodeId, Peer};

pub use outcome::{
    Outcome, OutcomeManager, Reporter, RoundOutcome, SuccessRule, Thresholds,
};

pub use params::{
    LinkParams, Parameter, Parameters, ParametersBuilder, ParametersError,
    RoundParams,
};

pub use peers::{
    connection::ConstantConnection, constant::Constant, euclidean::Euclidean,
    graph::FixedGraph, graph::RandomGraph, ConnectionStrategy, PeerStrategy,
};

pub use results::{
    DoubleSpendResults, Format, ResultsTable, StaleBlockResults, StaleTally,
    Tally,
};

pub use simulation::{
    DoubleSpendSimulation, SimulationError, SimulationGroup,
    StaleBlockSimulation,
};

pub use stale::{StaleBlockManager, StaleOutcome};
