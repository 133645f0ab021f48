//! The transport capability the core requires: deliver an operation to a node,
//! obtain an asynchronous result.
//!
//! At-least-once delivery is NOT assumed - the transport may silently drop or
//! time out, which is exactly why the consistency protocol carries a per-node
//! retry budget. Connection pooling, framing and wire codecs live behind this
//! trait and are out of scope for the core.
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::cluster::node::Node;
use crate::error::Result;
use crate::utils::serde_utf8_bytes;

pub mod mock;

/// An operation executed against a single partition owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read {
        #[serde(with = "serde_utf8_bytes")]
        key: Bytes,
    },
    Write {
        #[serde(with = "serde_utf8_bytes")]
        key: Bytes,
        #[serde(with = "serde_utf8_bytes")]
        value: Bytes,
    },
}

/// What a node answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResponse {
    /// The write was applied
    Written,
    /// The read completed; None means the key is unknown to that replica
    Value(Option<Bytes>),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers `operation` to `node`. An `Err` means the delivery or the
    /// remote execution failed; the consistency protocol decides whether to retry.
    async fn send(&self, node: &Node, operation: Operation) -> Result<OperationResponse>;
}
