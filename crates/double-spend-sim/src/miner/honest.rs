//! Honest/Frontier mining role

use std::sync::Arc;

use crate::{
    blockchain::{Blockchain, Tag},
    miner::NodeBehavior,
    node::NodeId,
    stale::StaleBlockManager,
};

/// Always follows the longest chain it hears of.
#[derive(Debug, Clone)]
pub struct Honest {
    manager: Arc<StaleBlockManager>,
}

impl Honest {
    /// Creates a new honest node which reports its progress to `manager`.
    pub fn new(manager: Arc<StaleBlockManager>) -> Self {
        Self { manager }
    }
}

impl NodeBehavior for Honest {
    fn name(&self) -> String {
        "Honest".to_string()
    }

    fn initial_tag(&self) -> Option<Tag> {
        None
    }

    fn on_block_mined(&self, _node: NodeId, chain: &Blockchain) {
        self.manager.register_chain(chain.length());
    }
}
