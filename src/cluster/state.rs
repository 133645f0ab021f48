//! This file contains the [`Cluster`] facade.
//!
//! The facade owns the authoritative local view: the sorted member set, the
//! current [`PartitionTable`] and the cluster version. Topology changes
//! (`node_up` / `node_down` / `repair`) are serialized through an async lock so
//! two rebuilds can never interleave their partial effects - each rebuild
//! produces a fresh immutable table that is swapped in atomically, the live
//! table is never mutated half-way.
//!
//! Peers don't compare full snapshots to detect divergence; they compare
//! [`Cluster::version`], which is bumped exactly once per committed change.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::Future;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{event, Level};

use super::consistency::{self, ConsistencyLevel, ConsistencyOutcome};
use super::load_balancing::LoadBalancingPolicy;
use super::node::{ClusterStatus, Node, NodeId, NodeStatus};
use super::partition_table::PartitionTable;
use super::partitioning::RangePartitioner;
use crate::error::{Error, Result};

/// A point-in-time view of the cluster, shipped to peers for reconciliation.
///
/// The partition table is deliberately absent: it is a pure function of the
/// sorted member list and the replication factor, so receivers recompute it
/// locally instead of pulling it over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Member nodes, sorted by id
    pub members: Vec<Node>,
    pub version: u64,
    pub status: ClusterStatus,
    /// The node that produced this snapshot
    pub source: NodeId,
}

pub struct Cluster {
    own_id: NodeId,
    replication_factor: usize,
    retry_budget: usize,
    partitioner: RangePartitioner,
    policy: Arc<dyn LoadBalancingPolicy>,
    inner: Mutex<ClusterInner>,
    /// Serializes topology changes. The std mutex above is only ever held for
    /// non-blocking reads and the final swap, never across an await point.
    topology_lock: AsyncMutex<()>,
}

struct ClusterInner {
    members: BTreeMap<NodeId, Node>,
    table: Arc<PartitionTable>,
    version: u64,
    status: ClusterStatus,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_lock() {
            Ok(inner) => write!(
                f,
                "Cluster {{ own_id: {}, version: {}, members: {} }}",
                self.own_id,
                inner.version,
                inner.members.len()
            ),
            Err(_) => write!(f, "Cluster {{ own_id: {}, <locked> }}", self.own_id),
        }
    }
}

impl Cluster {
    /// Creates the local view with `own_node` as its only member.
    ///
    /// The own node moves `StartUp -> Dirty` (started, not joined); it joins
    /// like any other member through [`Cluster::node_up`].
    pub fn new(
        mut own_node: Node,
        replication_factor: usize,
        retry_budget: usize,
        partitioner: RangePartitioner,
        policy: Arc<dyn LoadBalancingPolicy>,
    ) -> Result<Self> {
        if replication_factor == 0 {
            return Err(Error::InvalidConfig {
                reason: "replication_factor must be at least 1".to_string(),
            });
        }

        own_node.transition_to(NodeStatus::Dirty);
        let own_id = own_node.id.clone();
        policy.add(own_node.clone());

        let mut members = BTreeMap::new();
        members.insert(own_id.clone(), own_node);

        let cluster = Self {
            own_id,
            replication_factor,
            retry_budget,
            partitioner,
            policy,
            inner: Mutex::new(ClusterInner {
                members,
                table: Arc::new(PartitionTable::new()),
                version: 1,
                status: ClusterStatus::Unknown,
            }),
            topology_lock: AsyncMutex::new(()),
        };

        {
            let mut inner = cluster.acquire_lock()?;
            cluster.rebuild_and_swap(&mut inner);
        }

        Ok(cluster)
    }

    fn acquire_lock(&self) -> Result<MutexGuard<ClusterInner>> {
        self.inner.lock().map_err(|_| Error::Logic {
            reason: "Unable to acquire cluster state lock".to_string(),
        })
    }

    /// Registers a member (new or rejoining), rebuilds the partition table and
    /// bumps the cluster version. Resolves to the refreshed snapshot.
    ///
    /// Stale notifications (a lower per-node version than what we already hold)
    /// are ignored and resolve to the current snapshot unchanged.
    pub async fn node_up(&self, node: Node) -> Result<ClusterSnapshot> {
        let _topology = self.topology_lock.lock().await;
        let mut node = node;
        promote_to_up(&mut node);

        let mut inner = self.acquire_lock()?;
        if let Some(known) = inner.members.get(&node.id) {
            if known.version >= node.version && known.status == NodeStatus::Up {
                event!(Level::DEBUG, "ignoring stale node_up for {}", node.id);
                return Ok(self.snapshot_locked(&inner));
            }
        }

        event!(Level::INFO, "member {} is up", node.id);
        self.policy.add(node.clone());
        inner.members.insert(node.id.clone(), node);
        inner.version += 1;
        self.rebuild_and_swap(&mut inner);

        Ok(self.snapshot_locked(&inner))
    }

    /// Removes a member, rebuilds the partition table and bumps the version.
    /// Resolves to false when the node was not part of the local view - gossip
    /// may deliver removals duplicated or out of order.
    pub async fn node_down(&self, id: &NodeId) -> Result<bool> {
        let _topology = self.topology_lock.lock().await;

        let mut inner = self.acquire_lock()?;
        if inner.members.remove(id).is_none() {
            return Ok(false);
        }

        event!(Level::INFO, "member {} is down", id);
        self.policy.remove(id);
        inner.version += 1;
        self.rebuild_and_swap(&mut inner);

        Ok(true)
    }

    /// Explicit re-partition against a caller-supplied target view, used to
    /// converge after a detected divergence. A snapshot older than the local
    /// view is rejected (resolves to false) - the caller should repair itself
    /// from us instead.
    pub async fn repair(&self, target: ClusterSnapshot) -> Result<bool> {
        let _topology = self.topology_lock.lock().await;

        let mut inner = self.acquire_lock()?;
        if target.version < inner.version {
            event!(
                Level::WARN,
                "rejecting repair from {}: snapshot version {} is behind local {}",
                target.source,
                target.version,
                inner.version
            );
            return Ok(false);
        }

        event!(
            Level::INFO,
            "repairing local view from {} (version {} -> {})",
            target.source,
            inner.version,
            target.version
        );

        for id in inner.members.keys() {
            self.policy.remove(id);
        }

        let mut members = BTreeMap::new();
        for node in target.members {
            self.policy.add(node.clone());
            members.insert(node.id.clone(), node);
        }

        inner.members = members;
        inner.version = target.version + 1;
        self.rebuild_and_swap(&mut inner);

        Ok(true)
    }

    /// Entry point composing the load balancing policy and the consistency
    /// protocol: obtain the plan, fan the callback out, aggregate per `level`.
    pub async fn execute<F, Fut>(
        &self,
        level: ConsistencyLevel,
        callback: F,
    ) -> Result<ConsistencyOutcome>
    where
        F: Fn(Node) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let plan = self.policy.execution_plan();
        consistency::execute(plan, level, self.retry_budget, callback).await
    }

    /// Owners of the key's partition, lowest-sorted id first.
    pub fn preference_list(&self, key: &[u8]) -> Result<Vec<NodeId>> {
        let token = self.partitioner.build_token(key);
        let inner = self.acquire_lock()?;
        Ok(inner.table.token_owners(token))
    }

    /// The current partition table. Callers get a stable snapshot - rebuilds
    /// swap in a new table rather than mutating this one.
    pub fn partition_table(&self) -> Result<Arc<PartitionTable>> {
        Ok(self.acquire_lock()?.table.clone())
    }

    pub fn version(&self) -> Result<u64> {
        Ok(self.acquire_lock()?.version)
    }

    pub fn status(&self) -> Result<ClusterStatus> {
        Ok(self.acquire_lock()?.status)
    }

    /// Member nodes sorted by id.
    pub fn members(&self) -> Result<Vec<Node>> {
        Ok(self.acquire_lock()?.members.values().cloned().collect())
    }

    pub fn member(&self, id: &NodeId) -> Result<Option<Node>> {
        Ok(self.acquire_lock()?.members.get(id).cloned())
    }

    pub fn own_id(&self) -> &NodeId {
        &self.own_id
    }

    pub fn build_token(&self, key: &[u8]) -> super::token::Token {
        self.partitioner.build_token(key)
    }

    pub fn snapshot(&self) -> Result<ClusterSnapshot> {
        let inner = self.acquire_lock()?;
        Ok(self.snapshot_locked(&inner))
    }

    fn snapshot_locked(&self, inner: &ClusterInner) -> ClusterSnapshot {
        ClusterSnapshot {
            members: inner.members.values().cloned().collect(),
            version: inner.version,
            status: inner.status,
            source: self.own_id.clone(),
        }
    }

    /// Rebuilds the table from the current member set and swaps it in.
    ///
    /// When the member count can't satisfy the replication factor yet (cluster
    /// bootstrap), the membership change still commits but the table stays
    /// empty and the status drops to Unknown until enough members join.
    fn rebuild_and_swap(&self, inner: &mut ClusterInner) {
        let member_ids: BTreeSet<NodeId> = inner.members.keys().cloned().collect();
        match self
            .partitioner
            .build_partition_table(&member_ids, self.replication_factor)
        {
            Ok(table) => {
                // the committed swap is what confirms ownership as stable
                for partition in table.partitions() {
                    let _ = partition.change_state(
                        super::partition_table::PartitionState::Balancing,
                        super::partition_table::PartitionState::Ok,
                    );
                }

                inner.table = Arc::new(table);
                inner.status = ClusterStatus::Ok;
                event!(
                    Level::DEBUG,
                    "partition table rebuilt: {} partitions across {} members",
                    inner.table.len(),
                    member_ids.len()
                );
            }
            Err(err) => {
                event!(
                    Level::WARN,
                    "partition table rebuild skipped: {:?} - cluster status is now Unknown",
                    err
                );
                inner.table = Arc::new(PartitionTable::new());
                inner.status = ClusterStatus::Unknown;
            }
        }
    }
}

/// Routes a node's lifecycle to Up through whatever intermediate state the
/// state machine requires (StartUp goes through Synchronize; Dirty and Down
/// may move directly).
fn promote_to_up(node: &mut Node) {
    if node.status == NodeStatus::Up {
        return;
    }

    if !node.status.may_transition_to(NodeStatus::Up) {
        node.transition_to(NodeStatus::Synchronize);
    }

    node.transition_to(NodeStatus::Up);
}
