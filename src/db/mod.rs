//! Module that connects the [`Cluster`] facade and the [`Transport`] boundary
//! into the single interface callers execute operations through.
//!
//! `Db` is the coordinator role: it resolves the key's preference list from the
//! current partition table, fans the operation out through the consistency
//! protocol and reports the aggregated outcome. It deliberately knows nothing
//! about how replicas store bytes or how the transport frames messages.
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::{event, Level};

use crate::cluster::consistency::{self, ConsistencyLevel, ConsistencyOutcome};
use crate::cluster::load_balancing::round_robin::RoundRobin;
use crate::cluster::node::{Node, NodeId};
use crate::cluster::partitioning::RangePartitioner;
use crate::cluster::state::Cluster;
use crate::cluster::token;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::transport::{Operation, OperationResponse, Transport};

pub struct Db {
    cluster: Arc<Cluster>,
    transport: Arc<dyn Transport>,
    consistency_level: ConsistencyLevel,
    retry_budget: usize,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("cluster", &self.cluster)
            .field("consistency_level", &self.consistency_level)
            .field("retry_budget", &self.retry_budget)
            .finish()
    }
}

impl Db {
    pub fn new(
        cluster: Arc<Cluster>,
        transport: Arc<dyn Transport>,
        consistency_level: ConsistencyLevel,
        retry_budget: usize,
    ) -> Self {
        Self {
            cluster,
            transport,
            consistency_level,
            retry_budget,
        }
    }

    /// Builds the cluster view and the coordinator from a parsed [`Config`],
    /// with a round-robin load balancing policy.
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let own_node = Node::new(
            NodeId::new(config.node.id.clone()),
            Bytes::from(config.node.addr.clone()),
        );
        let cluster = Cluster::new(
            own_node,
            config.replication.factor,
            config.consistency.retry_budget,
            RangePartitioner::new(config.replication.partitions_per_node, token::build_token),
            Arc::new(RoundRobin::new()),
        )?;

        Ok(Self::new(
            Arc::new(cluster),
            transport,
            config.consistency.level,
            config.consistency.retry_budget,
        ))
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    /// Writes `value` under `key` to the key's replica set, honoring the
    /// configured consistency level.
    ///
    /// An unmet threshold comes back as a normal outcome with
    /// `satisfied == false`; only configuration problems (no replicas resolved
    /// for the key) surface as errors.
    pub async fn put(&self, key: Bytes, value: Bytes) -> Result<ConsistencyOutcome> {
        self.put_with_level(key, value, self.consistency_level).await
    }

    pub async fn put_with_level(
        &self,
        key: Bytes,
        value: Bytes,
        level: ConsistencyLevel,
    ) -> Result<ConsistencyOutcome> {
        let plan = self.replica_plan(&key)?;
        event!(
            Level::DEBUG,
            "coordinating a {} PUT across {} replicas",
            level,
            plan.len()
        );

        consistency::execute(plan, level, self.retry_budget, |node| {
            let transport = self.transport.clone();
            let key = key.clone();
            let value = value.clone();
            async move {
                transport
                    .send(&node, Operation::Write { key, value })
                    .await
                    .map(|_| true)
            }
        })
        .await
    }

    /// Reads `key` from its replica set. Returns the aggregated outcome plus
    /// the distinct values observed across acknowledging replicas (an empty
    /// vector when no replica knows the key).
    pub async fn get(&self, key: Bytes) -> Result<(ConsistencyOutcome, Vec<Bytes>)> {
        self.get_with_level(key, self.consistency_level).await
    }

    pub async fn get_with_level(
        &self,
        key: Bytes,
        level: ConsistencyLevel,
    ) -> Result<(ConsistencyOutcome, Vec<Bytes>)> {
        let plan = self.replica_plan(&key)?;
        event!(
            Level::DEBUG,
            "coordinating a {} GET across {} replicas",
            level,
            plan.len()
        );

        let values: Arc<Mutex<Vec<Bytes>>> = Default::default();
        let outcome = consistency::execute(plan, level, self.retry_budget, |node| {
            let transport = self.transport.clone();
            let key = key.clone();
            let values = values.clone();
            async move {
                match transport.send(&node, Operation::Read { key }).await? {
                    OperationResponse::Value(Some(value)) => {
                        if let Ok(mut guard) = values.lock() {
                            guard.push(value);
                        }
                        Ok(true)
                    }
                    // a replica that doesn't know the key still acknowledged the read
                    OperationResponse::Value(None) => Ok(true),
                    OperationResponse::Written => Err(Error::Logic {
                        reason: "transport answered a Read with a write acknowledgment"
                            .to_string(),
                    }),
                }
            }
        })
        .await?;

        let mut values = match values.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        };
        values.sort();
        values.dedup();

        Ok((outcome, values))
    }

    /// Resolves the ordered replica set for `key` from the current partition
    /// table. An empty resolution means the table isn't built yet (cluster
    /// still below its replication factor) and is reported as a config error.
    fn replica_plan(&self, key: &[u8]) -> Result<Vec<Node>> {
        let owners = self.cluster.preference_list(key)?;
        let mut plan = Vec::with_capacity(owners.len());
        for owner in owners {
            if let Some(node) = self.cluster.member(&owner)? {
                plan.push(node);
            } else {
                event!(
                    Level::WARN,
                    "partition owner {} is not a known member - stale table?",
                    owner
                );
            }
        }

        if plan.is_empty() {
            return Err(Error::EmptyExecutionPlan);
        }

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::node::NodeId;
    use crate::storage::StorageEngine;
    use crate::test_utils::fault::When;
    use crate::transport::mock::MockTransport;

    async fn test_db(n_nodes: usize, replication_factor: usize) -> (Db, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let config = Config::from_json(&format!(
            r#"{{
                "node": {{ "id": "node-000", "addr": "127.0.0.1:3000" }},
                "replication": {{ "factor": {}, "partitions_per_node": 4 }}
            }}"#,
            replication_factor
        ))
        .unwrap();

        let db = Db::from_config(&config, transport.clone()).unwrap();
        for i in 1..n_nodes {
            db.cluster()
                .node_up(Node::new(
                    NodeId::new(format!("node-{:03}", i)),
                    Bytes::from(format!("127.0.0.1:{}", 3000 + i)),
                ))
                .await
                .unwrap();
        }

        (db, transport)
    }

    #[tokio::test]
    async fn test_put_get_simple() {
        let (db, _) = test_db(3, 3).await;
        let key = Bytes::from("a key");
        let value = Bytes::from("a value");

        let outcome = db.put(key.clone(), value.clone()).await.unwrap();
        assert!(outcome.satisfied);
        assert_eq!(outcome.successes, 3);

        let (outcome, values) = db.get(key).await.unwrap();
        assert!(outcome.satisfied);
        assert_eq!(values, vec![value]);
    }

    #[tokio::test]
    async fn test_put_tolerates_minority_failures() {
        let (db, transport) = test_db(3, 3).await;
        let key = Bytes::from("a key");

        // knock out one of the three replicas (retry budget included)
        let owners = db.cluster().preference_list(&key).unwrap();
        transport.set_fault(owners[0].clone(), When::Always);

        let outcome = db.put(key, Bytes::from("a value")).await.unwrap();
        assert!(outcome.satisfied);
        assert_eq!(outcome.successes, 2);
        assert_eq!(outcome.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_put_quorum_not_met_is_a_normal_outcome() {
        let (db, transport) = test_db(3, 3).await;
        let key = Bytes::from("a key");

        let owners = db.cluster().preference_list(&key).unwrap();
        transport.set_fault(owners[0].clone(), When::Always);
        transport.set_fault(owners[1].clone(), When::Always);

        let outcome = db.put(key, Bytes::from("a value")).await.unwrap();
        assert!(!outcome.satisfied);
        assert_eq!(outcome.successes, 1);
        assert_eq!(outcome.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_put_before_table_exists_is_a_config_error() {
        // rf 3 but only one member: no table, no plan
        let (db, _) = test_db(1, 3).await;

        let err = db
            .put(Bytes::from("a key"), Bytes::from("a value"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::EmptyExecutionPlan));
    }

    #[tokio::test]
    async fn test_retry_recovers_a_flapping_replica() {
        let (db, transport) = test_db(3, 3).await;
        let key = Bytes::from("a key");

        // fails once, then recovers; the retry budget (1) absorbs it
        let owners = db.cluster().preference_list(&key).unwrap();
        transport.set_fault(owners[0].clone(), When::Times(1));

        let outcome = db
            .put_with_level(key, Bytes::from("a value"), ConsistencyLevel::All)
            .await
            .unwrap();
        assert!(outcome.satisfied);
        assert_eq!(outcome.successes, 3);
    }

    #[tokio::test]
    async fn test_get_merges_distinct_replica_values() {
        let (db, transport) = test_db(3, 3).await;
        let key = Bytes::from("a key");
        db.put(key.clone(), Bytes::from("a value")).await.unwrap();

        // one replica diverged
        let owners = db.cluster().preference_list(&key).unwrap();
        transport
            .store_of(&owners[0])
            .put(key.clone(), Bytes::from("a divergent value"))
            .await
            .unwrap();

        let (outcome, values) = db.get(key).await.unwrap();
        assert!(outcome.satisfied);
        assert_eq!(values.len(), 2);
    }

    #[tokio::test]
    async fn test_get_unknown_key_acknowledges_with_no_values() {
        let (db, _) = test_db(3, 3).await;

        let (outcome, values) = db.get(Bytes::from("missing")).await.unwrap();
        assert!(outcome.satisfied);
        assert!(values.is_empty());
    }
}
