//! Trusted (merchant side) role of a double-spend round

use std::sync::Arc;

use log::trace;

use crate::{
    blockchain::{Blockchain, Tag},
    miner::NodeBehavior,
    node::NodeId,
    outcome::OutcomeManager,
};

/// Mines honestly on the legitimate chain, but refuses the double-spend
/// chain until its own chain holds enough confirmations. Once a trusted node
/// switches to the double-spend chain it counts as convinced.
#[derive(Debug, Clone)]
pub struct Trusted {
    manager: Arc<OutcomeManager>,
}

impl Trusted {
    pub fn new(manager: Arc<OutcomeManager>) -> Self {
        Self { manager }
    }
}

impl NodeBehavior for Trusted {
    fn name(&self) -> String {
        "Trusted".to_string()
    }

    fn initial_tag(&self) -> Option<Tag> {
        Some(Tag::Legit)
    }

    fn ignore_chain(
        &self,
        local: &Blockchain,
        received: &Blockchain,
        _sender: NodeId,
    ) -> bool {
        received.carries_double_spend()
            && local.length() < self.manager.confirmations()
    }

    fn on_choice(&self, node: NodeId, old: &Blockchain, new: &Blockchain) {
        match (old.carries_double_spend(), new.carries_double_spend()) {
            (false, true) => {
                trace!("trusted node {} is convinced by {}", node, new);
                self.manager.add_convinced();
            }
            (true, false) => {
                trace!("trusted node {} went back to {}", node, new);
                self.manager.remove_convinced();
            }
            _ => (),
        }
    }

    fn on_block_mined(&self, _node: NodeId, chain: &Blockchain) {
        if chain.carries_double_spend() {
            self.manager.register_attacker_chain(chain.length());
        } else {
            self.manager.register_trusted_chain(chain.length());
        }
    }
}
