//! This module defines the errors that can be returned by ringdb.
//!
//! Note that an unmet consistency threshold is NOT an error - it's a normal
//! outcome reported by [`crate::cluster::consistency::ConsistencyOutcome`].
//! Only configuration/programming problems and infrastructure failures show up here.

use std::fmt::Display;

use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

/// Error enum with all possible variants
#[derive(Debug, Serialize)]
pub enum Error {
    /// Asked to build a partition table with a replication factor larger than the member set.
    /// No partial table is ever produced in this case.
    ReplicationUnsatisfiable {
        members: usize,
        replication_factor: usize,
    },
    /// The load balancing policy produced an empty execution plan.
    /// This is a configuration/programming error, distinct from an unmet consistency threshold.
    EmptyExecutionPlan,
    InvalidConfig {
        reason: String,
    },
    Io {
        reason: String,
    },
    Logic {
        reason: String,
    },
    Internal(Internal),
    Transport {
        reason: String,
    },
}

impl Error {
    /// Returns true if this is an instance of a [`Error::ReplicationUnsatisfiable`] variant
    pub fn is_replication_unsatisfiable(&self) -> bool {
        matches!(self, Error::ReplicationUnsatisfiable { .. })
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

impl From<crate::storage::Error> for Error {
    fn from(err: crate::storage::Error) -> Self {
        Self::Internal(Internal::StorageEngine(err))
    }
}

#[derive(Debug, Serialize)]
pub enum Internal {
    Logic { reason: String },
    Unknown { reason: String },
    StorageEngine(crate::storage::Error),
}
