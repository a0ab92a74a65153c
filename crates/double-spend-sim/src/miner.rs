/*!
Role-specific node behavior

Every [`Node`](crate::node::Node) runs the same mining loop and the same
longest-chain rule. What differs between roles is which received chains a
node refuses to consider, and which of its own chain updates it reports. A
role is any type which implements the [`NodeBehavior`] trait.

# Built-In Roles
- Trusted nodes of a double-spend round [`trusted::Trusted`]
- Attacker nodes of a double-spend round [`attacker::Attacker`]
- Plain longest-chain miners for stale block measurements [`honest::Honest`]
*/

use std::fmt::Debug;

use crate::{
    blockchain::{Blockchain, Tag},
    node::NodeId,
};

pub mod attacker;
pub mod honest;
pub mod trusted;

/// Hooks through which a node's role takes part in chain selection.
///
/// All hooks are called while the node's chain lock is held, so they run
/// mutually exclusive with each other for one node, but concurrently across
/// nodes.
pub trait NodeBehavior: Debug + Send + Sync {
    /// Returns the name of this role.
    fn name(&self) -> String;

    /// Tag of the empty chain a node starts every round with.
    fn initial_tag(&self) -> Option<Tag>;

    /// Returns true if `received`, delivered by `sender`, must be dropped
    /// without comparing it to `local`.
    fn ignore_chain(
        &self,
        _local: &Blockchain,
        _received: &Blockchain,
        _sender: NodeId,
    ) -> bool {
        false
    }

    /// Called after every fork-choice decision. `old` and `new` are the same
    /// chain when the received chain was declined.
    fn on_choice(&self, _node: NodeId, _old: &Blockchain, _new: &Blockchain) {}

    /// Called after `node` extended its own chain to `chain`.
    fn on_block_mined(&self, node: NodeId, chain: &Blockchain);
}
