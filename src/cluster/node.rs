//! Cluster member definitions.
//!
//! A [`Node`] is a member of the cluster: a globally unique, sortable [`NodeId`],
//! a network address, a per-node version tick and a lifecycle [`NodeStatus`].
//! Partition owner sets store [`NodeId`]s, never [`Node`] values, so that a stale
//! snapshot of a member can't alias the authoritative one held by the cluster state.
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::utils::serde_utf8_bytes;

/// Globally unique node identifier. The total `Ord` on ids is what makes
/// replica placement deterministic - see [`crate::cluster::partitioning`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(#[serde(with = "serde_utf8_bytes")] Bytes);

impl NodeId {
    pub fn new(id: impl Into<Bytes>) -> Self {
        Self(id.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

/// Node lifecycle.
///
/// ```text
/// StartUp -> { Dirty, Synchronize } -> { Up, Down }
/// Up      -> { Synchronize, Down }
/// Down    -> { Up }
/// ```
///
/// `Dirty` means the process started but did not join a cluster yet.
/// `Synchronize` means the node is reconciling partition ownership after a
/// membership event. `Down` can go back to `Up` when the node rejoins.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    StartUp,
    Dirty,
    Synchronize,
    Up,
    Down,
}

impl NodeStatus {
    /// Whether the lifecycle state machine allows moving from `self` to `next`.
    pub fn may_transition_to(&self, next: NodeStatus) -> bool {
        use NodeStatus::*;
        matches!(
            (self, next),
            (StartUp, Dirty)
                | (StartUp, Synchronize)
                | (Dirty, Up)
                | (Dirty, Down)
                | (Synchronize, Up)
                | (Synchronize, Down)
                | (Up, Synchronize)
                | (Up, Down)
                | (Down, Up)
        )
    }
}

/// Overall health of the local view of the cluster.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Ok,
    Inconsistent,
    Unknown,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// The IP/PORT pair formatted as <ip>:<port>
    #[serde(with = "serde_utf8_bytes")]
    pub addr: Bytes,
    /// Incremented on every update to this node's entry. Peers use it to tell
    /// which of two views of the same node is the most recent.
    pub version: u128,
    /// Unix millis of the last update to this entry.
    pub last_updated_at_ms: u128,
    pub status: NodeStatus,
}

impl Node {
    pub fn new(id: NodeId, addr: Bytes) -> Self {
        Self {
            id,
            addr,
            version: 0,
            last_updated_at_ms: now_ms(),
            status: NodeStatus::StartUp,
        }
    }

    /// Bumps the per-node version tick and refreshes the update timestamp.
    pub fn touch(&mut self) {
        self.version += 1;
        self.last_updated_at_ms = now_ms();
    }

    /// Applies a lifecycle transition, validating it against [`NodeStatus::may_transition_to`].
    /// Returns false (and leaves the node untouched) when the transition is illegal.
    pub fn transition_to(&mut self, next: NodeStatus) -> bool {
        if self.status == next {
            return true;
        }

        if !self.status.may_transition_to(next) {
            return false;
        }

        self.status = next;
        self.touch();
        true
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_happy_path() {
        let mut node = Node::new(NodeId::from("node-a"), Bytes::from("127.0.0.1:3001"));
        assert_eq!(node.status, NodeStatus::StartUp);

        assert!(node.transition_to(NodeStatus::Synchronize));
        assert!(node.transition_to(NodeStatus::Up));
        assert!(node.transition_to(NodeStatus::Down));
        assert!(node.transition_to(NodeStatus::Up));
    }

    #[test]
    fn test_lifecycle_rejects_illegal_transitions() {
        let mut node = Node::new(NodeId::from("node-a"), Bytes::from("127.0.0.1:3001"));

        // can't jump from StartUp straight to Up
        assert!(!node.transition_to(NodeStatus::Up));
        assert_eq!(node.status, NodeStatus::StartUp);

        assert!(node.transition_to(NodeStatus::Dirty));
        assert!(!node.transition_to(NodeStatus::Synchronize));
        assert!(node.transition_to(NodeStatus::Up));
    }

    #[test]
    fn test_transition_bumps_version() {
        let mut node = Node::new(NodeId::from("node-a"), Bytes::from("127.0.0.1:3001"));
        let before = node.version;
        assert!(node.transition_to(NodeStatus::Dirty));
        assert!(node.version > before);
    }

    #[test]
    fn test_node_id_sort_order_is_total_and_stable() {
        let mut ids = vec![
            NodeId::from("node-c"),
            NodeId::from("node-a"),
            NodeId::from("node-b"),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                NodeId::from("node-a"),
                NodeId::from("node-b"),
                NodeId::from("node-c")
            ]
        );
    }
}
