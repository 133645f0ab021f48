//! Load balancing policies - how the member set is ordered into an execution plan.
//!
//! The consistency protocol doesn't care how candidates are ordered; it takes
//! whatever plan the configured policy produces. Policies own the membership
//! notifications (`add`/`remove`) and must tolerate those arriving concurrently
//! with plan requests.
use super::node::{Node, NodeId};

pub mod round_robin;

/// The contract a node-ordering policy must satisfy.
///
/// All methods may be called concurrently from multiple tasks.
pub trait LoadBalancingPolicy: Send + Sync {
    /// Membership notification: `node` joined (or was updated).
    fn add(&self, node: Node);

    /// Membership notification: the node left. Once this returns, neither
    /// [`Self::next`] nor [`Self::execution_plan`] may yield the removed peer.
    fn remove(&self, id: &NodeId);

    /// The next node in the policy's rotation discipline. Must eventually cycle
    /// through every current peer. None when no peers are registered.
    fn next(&self) -> Option<Node>;

    /// Ordered candidate list for one logical operation - order encodes
    /// preference (most preferred first).
    fn execution_plan(&self) -> Vec<Node>;

    fn peer_count(&self) -> usize;
}
