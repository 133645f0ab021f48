//! Mock [`Transport`] backed by one [`InMemory`] storage engine per node.
//!
//! Faults are injected per node id so tests can knock specific replicas out
//! (or make them flap for a bounded number of calls) and observe how the
//! consistency protocol reacts. Call counts are recorded per node, which is
//! how retry-attempt assertions are written.
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use super::{Operation, OperationResponse, Transport};
use crate::cluster::node::{Node, NodeId};
use crate::error::{Error, Result};
use crate::storage::{in_memory::InMemory, StorageEngine};
use crate::test_utils::fault::{Fault, When};

#[derive(Debug, Default)]
struct MockTransportInner {
    stores: HashMap<NodeId, InMemory>,
    faults: HashMap<NodeId, Fault>,
    calls: HashMap<NodeId, usize>,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(self, id: NodeId, when: When) -> Self {
        self.set_fault(id, when);
        self
    }

    pub fn set_fault(&self, id: NodeId, when: When) {
        self.acquire_lock().faults.insert(id, Fault { when });
    }

    /// How many `send` calls reached the given node (failed ones included)
    pub fn calls_to(&self, id: &NodeId) -> usize {
        self.acquire_lock().calls.get(id).copied().unwrap_or(0)
    }

    /// Direct peek into a node's store, bypassing faults. Test assertions only.
    pub fn store_of(&self, id: &NodeId) -> InMemory {
        self.acquire_lock()
            .stores
            .entry(id.clone())
            .or_default()
            .clone()
    }

    fn acquire_lock(&self) -> MutexGuard<MockTransportInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, node: &Node, operation: Operation) -> Result<OperationResponse> {
        let store = {
            let mut inner = self.acquire_lock();
            *inner.calls.entry(node.id.clone()).or_default() += 1;

            if let Some(fault) = inner.faults.get_mut(&node.id) {
                if fault.should_fail() {
                    return Err(Error::Transport {
                        reason: format!("Mocked transport error sending to {}", node.id),
                    });
                }
            }

            inner.stores.entry(node.id.clone()).or_default().clone()
        };

        match operation {
            Operation::Read { key } => Ok(OperationResponse::Value(store.get(&key).await?)),
            Operation::Write { key, value } => {
                store.put(key, value).await?;
                Ok(OperationResponse::Written)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn node(name: &str) -> Node {
        Node::new(NodeId::from(name), Bytes::from("127.0.0.1:3001"))
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let transport = MockTransport::new();
        let target = node("node-a");

        let response = transport
            .send(
                &target,
                Operation::Write {
                    key: Bytes::from("k"),
                    value: Bytes::from("v"),
                },
            )
            .await
            .unwrap();
        assert_eq!(response, OperationResponse::Written);

        let response = transport
            .send(
                &target,
                Operation::Read {
                    key: Bytes::from("k"),
                },
            )
            .await
            .unwrap();
        assert_eq!(response, OperationResponse::Value(Some(Bytes::from("v"))));
    }

    #[tokio::test]
    async fn test_stores_are_per_node() {
        let transport = MockTransport::new();
        transport
            .send(
                &node("node-a"),
                Operation::Write {
                    key: Bytes::from("k"),
                    value: Bytes::from("v"),
                },
            )
            .await
            .unwrap();

        let response = transport
            .send(
                &node("node-b"),
                Operation::Read {
                    key: Bytes::from("k"),
                },
            )
            .await
            .unwrap();
        assert_eq!(response, OperationResponse::Value(None));
    }

    #[tokio::test]
    async fn test_fault_injection_and_call_counts() {
        let transport = MockTransport::new().with_fault(NodeId::from("node-a"), When::Times(1));
        let target = node("node-a");
        let read = Operation::Read {
            key: Bytes::from("k"),
        };

        assert!(transport.send(&target, read.clone()).await.is_err());
        assert!(transport.send(&target, read).await.is_ok());
        assert_eq!(transport.calls_to(&target.id), 2);
    }
}
