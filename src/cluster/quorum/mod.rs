//! Quorum accumulators - the aggregation building block of the consistency protocol.
//!
//! The executor in [`crate::cluster::consistency`] feeds every finalized
//! per-node outcome into a [`Quorum`] instance and reads the verdict out of
//! [`Quorum::finish`] once all outcomes are in. The accumulator itself is
//! synchronous and knows nothing about retries or scheduling.

pub mod min_required_replicas;
use crate::error::Result;

/// Current verdict of a [`Quorum`] after an [`Quorum::update`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Evaluation {
    /// The required number of successes was observed
    Reached,
    /// Not enough successes yet, but still possible
    NotReached,
    /// Given the failures already observed, no amount of further successes can meet the threshold
    Unreachable,
}

/// Argument passed to [`Quorum::update`] to record a single node's final outcome
pub enum OperationStatus<T, E> {
    Success(T),
    Failure(E),
}

/// What a consumed [`Quorum`] leaves behind.
#[derive(Debug)]
pub struct QuorumResult<T, E> {
    pub evaluation: Evaluation,
    /// Number of outcomes this quorum was sized for
    pub total: usize,
    /// The success threshold it was evaluating against
    pub required: usize,
    pub successes: Vec<T>,
    pub failures: Vec<E>,
}

/// Trait that defines the Quorum interface.
pub trait Quorum<T, E> {
    /// Updates the internal state with either a success or a failure.
    /// Returns an error if called more times than the quorum was sized for.
    fn update(&mut self, operation_status: OperationStatus<T, E>) -> Result<Evaluation>;

    /// Consumes the quorum and returns the final [`QuorumResult`]
    fn finish(self) -> QuorumResult<T, E>;
}
