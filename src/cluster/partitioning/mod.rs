//! Range partitioning - the default partitioning scheme for ringdb.
//!
//! The token domain is split into fixed-width contiguous ranges and each range
//! is assigned to `replication_factor` owning nodes. Placement walks the sorted
//! member list: member `i` is the primary for its slice of
//! [`PARTITIONS_PER_NODE`] partitions and members `(i + 1) % m .. (i + r - 1) % m`
//! hold the replicas - the classic "owner plus next N-1 members around the ring"
//! scheme, which lands all replicas of a partition on distinct nodes as long as
//! the replication factor does not exceed the member count.
//!
//! [`RangePartitioner::build_partition_table`] is a pure function of the sorted
//! member list and the replication factor. Every node independently computing a
//! table from the same membership view gets an identical result, which is what
//! lets the membership protocol avoid shipping the full table over the wire.
use tracing::{event, Level};

use super::node::NodeId;
use super::partition_table::{Partition, PartitionState, PartitionTable};
use super::token::{self, HashFn, Token, MAX_TOKEN};
use crate::error::{Error, Result};
use std::collections::BTreeSet;

/// How many partitions each member contributes to the ring. Large enough that
/// future rebalancing moves data in small shards.
pub const PARTITIONS_PER_NODE: usize = 256;

#[derive(Clone)]
pub struct RangePartitioner {
    partitions_per_node: usize,
    hash_fn: HashFn,
}

impl std::fmt::Debug for RangePartitioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangePartitioner")
            .field("partitions_per_node", &self.partitions_per_node)
            .finish()
    }
}

impl Default for RangePartitioner {
    fn default() -> Self {
        Self {
            partitions_per_node: PARTITIONS_PER_NODE,
            hash_fn: token::build_token,
        }
    }
}

impl RangePartitioner {
    /// Mostly a test seam - lets callers pin a tiny hash table or a smaller
    /// shard count instead of murmur3 over 256 partitions per node.
    pub fn new(partitions_per_node: usize, hash_fn: HashFn) -> Self {
        Self {
            partitions_per_node,
            hash_fn,
        }
    }

    pub fn partitions_per_node(&self) -> usize {
        self.partitions_per_node
    }

    /// Hashes a user key into its ring position. Stable across runs and pure.
    pub fn build_token(&self, key: &[u8]) -> Token {
        (self.hash_fn)(key)
    }

    /// Divides the full token domain into `number_of_partitions` contiguous,
    /// non-overlapping half-open ranges of equal width. The final range is
    /// closed at [`MAX_TOKEN`] so the integer-division remainder stays covered.
    /// All returned partitions start in [`PartitionState::Balancing`] - they are
    /// not yet confirmed stable.
    pub fn split(number_of_partitions: usize) -> Result<Vec<Partition>> {
        if number_of_partitions == 0 {
            return Err(Error::Logic {
                reason: "Can't split the token domain into 0 partitions".to_string(),
            });
        }

        let width = u128::MAX / number_of_partitions as u128;
        let mut partitions = Vec::with_capacity(number_of_partitions);
        for i in 0..number_of_partitions as u128 {
            let start = token::token_from_offset(i * width);
            let end = if i == number_of_partitions as u128 - 1 {
                MAX_TOKEN
            } else {
                token::token_from_offset((i + 1) * width)
            };
            partitions.push(Partition::new(start, end, PartitionState::Balancing));
        }

        Ok(partitions)
    }

    /// Deterministically derives a [`PartitionTable`] from a membership snapshot.
    ///
    /// # Errors
    /// [`Error::ReplicationUnsatisfiable`] when fewer members than the requested
    /// replication factor exist - no partial table is produced in that case.
    pub fn build_partition_table(
        &self,
        members: &BTreeSet<NodeId>,
        replication_factor: usize,
    ) -> Result<PartitionTable> {
        if replication_factor == 0 {
            return Err(Error::Logic {
                reason: "replication_factor must be at least 1".to_string(),
            });
        }

        if members.len() < replication_factor {
            event!(
                Level::WARN,
                "Can't place {} replicas across {} members",
                replication_factor,
                members.len()
            );
            return Err(Error::ReplicationUnsatisfiable {
                members: members.len(),
                replication_factor,
            });
        }

        let members: Vec<&NodeId> = members.iter().collect();
        let partitions = Self::split(members.len() * self.partitions_per_node)?;

        let table = PartitionTable::new();
        for (i, _) in members.iter().enumerate() {
            let slice_start = i * self.partitions_per_node;
            for partition in &partitions[slice_start..slice_start + self.partitions_per_node] {
                for r in 0..replication_factor {
                    let owner = members[(i + r) % members.len()];
                    table.add_partition(partition.clone(), owner.clone());
                }
            }
        }

        Ok(table)
    }
}
