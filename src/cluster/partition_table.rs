//! The [`Partition`] and [`PartitionTable`] data structures.
//!
//! A partition is an immutable half-open token range `[start, end)` (the last
//! range of the ring is closed at [`MAX_TOKEN`]) with a mutable lifecycle state.
//! The table maps each partition to the set of nodes owning a replica of it.
//!
//! Both structures are touched concurrently during steady state: rebalancing
//! flips partition states while incremental owner additions race with readers.
//! State transitions are compare-and-swap (a losing caller observes who won,
//! nothing is ever overwritten silently) and the owner map is a [`DashMap`] so
//! concurrent upserts for different owners of the same partition compose
//! without lost updates or a global lock.
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::node::NodeId;
use super::token::{Token, MAX_TOKEN};

/// Lifecycle of a partition.
///
/// Allowed transitions (all via [`Partition::change_state`]):
/// `Balancing -> Ok` once ownership is confirmed stable,
/// `Ok -> Balancing` when a rebalance starts,
/// `Ok | Balancing -> Remove` when the range is being retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PartitionState {
    Ok = 0,
    Balancing = 1,
    Remove = 2,
}

impl PartitionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PartitionState::Ok,
            1 => PartitionState::Balancing,
            // the cell is only ever written from PartitionState values
            _ => PartitionState::Remove,
        }
    }
}

/// A contiguous token range plus its lifecycle state.
///
/// Identity (equality, hashing, ordering) is defined by `(start, end)` only -
/// the state cell is excluded so a partition keeps working as a map key while
/// its state changes. Clones share the state cell.
#[derive(Debug, Clone)]
pub struct Partition {
    start: Token,
    end: Token,
    state: Arc<AtomicU8>,
}

impl Partition {
    pub fn new(start: Token, end: Token, state: PartitionState) -> Self {
        Self {
            start,
            end,
            state: Arc::new(AtomicU8::new(state as u8)),
        }
    }

    pub fn start(&self) -> Token {
        self.start
    }

    pub fn end(&self) -> Token {
        self.end
    }

    /// Whether the token falls inside this range.
    ///
    /// Ranges are half-open on the right, except the final range of the ring
    /// (`end == MAX_TOKEN`) which is closed so the domain has no uncovered point.
    pub fn contains(&self, token: Token) -> bool {
        token >= self.start && (token < self.end || (self.end == MAX_TOKEN && token == MAX_TOKEN))
    }

    pub fn state(&self) -> PartitionState {
        PartitionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Compare-and-swap state transition.
    ///
    /// Succeeds only if the current state equals `expected`. On contention the
    /// observed state is returned so the caller knows someone else moved the
    /// partition first - that is coordination, not an error, and callers may
    /// retry their own transition or abandon it.
    pub fn change_state(
        &self,
        expected: PartitionState,
        next: PartitionState,
    ) -> std::result::Result<(), PartitionState> {
        self.state
            .compare_exchange(
                expected as u8,
                next as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(PartitionState::from_u8)
    }
}

impl PartialEq for Partition {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }
}

impl Eq for Partition {}

impl Hash for Partition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.end.hash(state);
    }
}

impl PartialOrd for Partition {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Partition {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.start, self.end).cmp(&(other.start, other.end))
    }
}

/// Mapping from [`Partition`] to its set of owning node ids.
///
/// Built wholesale by [`crate::cluster::partitioning::RangePartitioner`] from a
/// membership snapshot; individual entries can also be added incrementally and
/// concurrently. Published tables are swapped atomically by the cluster state,
/// never mutated in place by the builder after publication.
#[derive(Debug, Default)]
pub struct PartitionTable {
    partitions: DashMap<Partition, BTreeSet<NodeId>>,
}

impl PartitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent, concurrency-safe upsert of `owner` into the owner set of `partition`.
    /// Concurrent calls for different owners of the same partition compose - the
    /// entry is mutated under the map shard lock, never replaced wholesale.
    pub fn add_partition(&self, partition: Partition, owner: NodeId) {
        self.partitions.entry(partition).or_default().insert(owner);
    }

    /// Returns one deterministic representative owner (the lowest-sorted id),
    /// or None if the partition is unknown to this table.
    pub fn owner_of(&self, partition: &Partition) -> Option<NodeId> {
        self.partitions
            .get(partition)
            .and_then(|owners| owners.iter().next().cloned())
    }

    /// The full owner set of a partition, if known.
    pub fn owners_of(&self, partition: &Partition) -> Option<BTreeSet<NodeId>> {
        self.partitions.get(partition).map(|owners| owners.clone())
    }

    /// Finds the partition whose range contains `token`.
    ///
    /// Returns None when no stored range covers the token. That must not happen
    /// on a well-formed table spanning the full domain, but lookups on stale or
    /// partially-built tables must degrade to "absent", never panic.
    pub fn partition_of(&self, token: Token) -> Option<Partition> {
        self.partitions
            .iter()
            .find(|entry| entry.key().contains(token))
            .map(|entry| entry.key().clone())
    }

    /// Representative owner for the partition containing `token`.
    pub fn token_owner(&self, token: Token) -> Option<NodeId> {
        self.partition_of(token)
            .and_then(|partition| self.owner_of(&partition))
    }

    /// All owners of the partition containing `token`, lowest-sorted first.
    pub fn token_owners(&self, token: Token) -> Vec<NodeId> {
        self.partition_of(token)
            .and_then(|partition| self.owners_of(&partition))
            .map(|owners| owners.into_iter().collect())
            .unwrap_or_default()
    }

    /// All partitions, sorted by start token ascending.
    pub fn partitions(&self) -> Vec<Partition> {
        let mut partitions: Vec<Partition> = self
            .partitions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        partitions.sort();
        partitions
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

/// Structural equality: same ranges mapped to the same owner sets.
/// Partition states are excluded, consistent with [`Partition`] identity.
impl PartialEq for PartitionTable {
    fn eq(&self, other: &Self) -> bool {
        if self.partitions.len() != other.partitions.len() {
            return false;
        }

        self.partitions.iter().all(|entry| {
            other
                .partitions
                .get(entry.key())
                .map(|owners| *owners == *entry.value())
                .unwrap_or(false)
        })
    }
}

impl Eq for PartitionTable {}
