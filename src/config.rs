//! Node configuration.
//!
//! Deserialized from JSON; every knob has a default matching the constants the
//! protocol is specified against (replication factor 3, 256 partitions per
//! node, QUORUM consistency, a single retry).
use serde::{Deserialize, Serialize};

use crate::cluster::consistency::{ConsistencyLevel, DEFAULT_RETRY_BUDGET};
use crate::cluster::partitioning::PARTITIONS_PER_NODE;
use crate::error::{Error, Result};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub replication: Replication,
    #[serde(default)]
    pub consistency: Consistency,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NodeConfig {
    /// Globally unique, sortable member identifier
    pub id: String,
    /// The IP/PORT pair formatted as <ip>:<port>
    pub addr: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Replication {
    #[serde(default = "default_replication_factor")]
    pub factor: usize,
    #[serde(default = "default_partitions_per_node")]
    pub partitions_per_node: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Consistency {
    #[serde(default)]
    pub level: ConsistencyLevel,
    #[serde(default = "default_retry_budget")]
    pub retry_budget: usize,
}

fn default_replication_factor() -> usize {
    3
}

fn default_partitions_per_node() -> usize {
    PARTITIONS_PER_NODE
}

fn default_retry_budget() -> usize {
    DEFAULT_RETRY_BUDGET
}

impl Default for Replication {
    fn default() -> Self {
        Self {
            factor: default_replication_factor(),
            partitions_per_node: default_partitions_per_node(),
        }
    }
}

impl Default for Consistency {
    fn default() -> Self {
        Self {
            level: ConsistencyLevel::default(),
            retry_budget: default_retry_budget(),
        }
    }
}

impl Config {
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw).map_err(|e| Error::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.id.is_empty() {
            return Err(Error::InvalidConfig {
                reason: "node.id must not be empty".to_string(),
            });
        }

        if self.replication.factor == 0 {
            return Err(Error::InvalidConfig {
                reason: "replication.factor must be at least 1".to_string(),
            });
        }

        if self.replication.partitions_per_node == 0 {
            return Err(Error::InvalidConfig {
                reason: "replication.partitions_per_node must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}
