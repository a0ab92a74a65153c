/*!
Multi-threaded simulator of double-spend attacks and stale blocks in a
peer-to-peer mining network.

Every node mines on its own thread. Nodes advance in lockstep batches of
mining attempts, send each block they find to their peers after the link
latency, and follow the longest chain they know of. Attacker nodes mine a
private fork carrying a conflicting transaction; a round ends once the attack
has succeeded or can no longer be expected to succeed.
*/

pub mod blockchain;
pub mod graph;
pub mod miner;
pub mod network;
pub mod node;
pub mod outcome;
pub mod params;
pub mod peers;
pub mod prelude;
pub mod results;
pub mod scheduler;
pub mod simulation;
pub mod stale;
pub mod sync;

pub(crate) mod utils;
