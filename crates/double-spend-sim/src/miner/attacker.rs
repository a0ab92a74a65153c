//! Attacker role of a double-spend round

use std::sync::Arc;

use crate::{
    blockchain::{Blockchain, Tag},
    miner::NodeBehavior,
    node::NodeId,
    outcome::OutcomeManager,
};

/// Mines on the private double-spend fork and never abandons it for a chain
/// without the conflicting transaction.
#[derive(Debug, Clone)]
pub struct Attacker {
    manager: Arc<OutcomeManager>,
}

impl Attacker {
    pub fn new(manager: Arc<OutcomeManager>) -> Self {
        Self { manager }
    }
}

impl NodeBehavior for Attacker {
    fn name(&self) -> String {
        "Attacker".to_string()
    }

    fn initial_tag(&self) -> Option<Tag> {
        Some(Tag::DoubleSpend)
    }

    fn ignore_chain(
        &self,
        _local: &Blockchain,
        received: &Blockchain,
        _sender: NodeId,
    ) -> bool {
        !received.carries_double_spend()
    }

    fn on_block_mined(&self, _node: NodeId, chain: &Blockchain) {
        self.manager.register_attacker_chain(chain.length());
    }
}
