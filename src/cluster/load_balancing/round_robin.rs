//! Round-robin [`LoadBalancingPolicy`] - the default ordering discipline.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::LoadBalancingPolicy;
use crate::cluster::node::{Node, NodeId};

/// Rotates over the peer list using an atomic cursor. Peers are kept sorted by
/// id so the rotation order is stable across nodes holding the same view.
#[derive(Debug, Default)]
pub struct RoundRobin {
    peers: Mutex<Vec<Node>>,
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    fn peers(&self) -> MutexGuard<Vec<Node>> {
        // a poisoned peer list is still structurally valid - keep serving it
        match self.peers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl LoadBalancingPolicy for RoundRobin {
    fn add(&self, node: Node) {
        let mut peers = self.peers();
        match peers.binary_search_by(|peer| peer.id.cmp(&node.id)) {
            Ok(i) => peers[i] = node,
            Err(i) => peers.insert(i, node),
        }
    }

    fn remove(&self, id: &NodeId) {
        let mut peers = self.peers();
        if let Ok(i) = peers.binary_search_by(|peer| peer.id.cmp(id)) {
            peers.remove(i);
        }
    }

    fn next(&self) -> Option<Node> {
        let peers = self.peers();
        if peers.is_empty() {
            return None;
        }

        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % peers.len();
        Some(peers[i].clone())
    }

    fn execution_plan(&self) -> Vec<Node> {
        let peers = self.peers();
        if peers.is_empty() {
            return Vec::new();
        }

        let start = self.cursor.load(Ordering::Relaxed) % peers.len();
        (0..peers.len())
            .map(|i| peers[(start + i) % peers.len()].clone())
            .collect()
    }

    fn peer_count(&self) -> usize {
        self.peers().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashSet;

    fn node(name: &str) -> Node {
        Node::new(NodeId::from(name), Bytes::from("127.0.0.1:3001"))
    }

    #[test]
    fn test_next_cycles_through_all_peers() {
        let policy = RoundRobin::new();
        policy.add(node("node-b"));
        policy.add(node("node-a"));
        policy.add(node("node-c"));

        let mut seen = HashSet::new();
        for _ in 0..3 {
            seen.insert(policy.next().unwrap().id);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_removed_peer_never_returned_again() {
        let policy = RoundRobin::new();
        policy.add(node("node-a"));
        policy.add(node("node-b"));

        policy.remove(&NodeId::from("node-a"));
        for _ in 0..10 {
            assert_eq!(policy.next().unwrap().id, NodeId::from("node-b"));
        }
        assert_eq!(policy.peer_count(), 1);
    }

    #[test]
    fn test_add_replaces_existing_entry() {
        let policy = RoundRobin::new();
        policy.add(node("node-a"));

        let mut updated = node("node-a");
        updated.addr = Bytes::from("127.0.0.1:9999");
        policy.add(updated);

        assert_eq!(policy.peer_count(), 1);
        assert_eq!(policy.next().unwrap().addr, Bytes::from("127.0.0.1:9999"));
    }

    #[test]
    fn test_execution_plan_contains_every_peer_once() {
        let policy = RoundRobin::new();
        for name in ["node-c", "node-a", "node-d", "node-b"] {
            policy.add(node(name));
        }

        let plan = policy.execution_plan();
        assert_eq!(plan.len(), 4);
        let unique: HashSet<NodeId> = plan.iter().map(|n| n.id.clone()).collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_execution_plan_rotates_with_the_cursor() {
        let policy = RoundRobin::new();
        policy.add(node("node-a"));
        policy.add(node("node-b"));
        policy.add(node("node-c"));

        let first = policy.execution_plan();
        policy.next();
        let second = policy.execution_plan();
        assert_ne!(first[0].id, second[0].id);
    }

    #[test]
    fn test_empty_policy() {
        let policy = RoundRobin::new();
        assert!(policy.next().is_none());
        assert!(policy.execution_plan().is_empty());
        assert_eq!(policy.peer_count(), 0);
    }
}
