//! The counting [`Quorum`] used for ONE/QUORUM/ALL aggregation.
//!
//! [`MinRequiredReplicas`] is sized for the execution plan (`total` outcomes)
//! and a success threshold derived from the consistency level. It reports
//! [`Evaluation::Unreachable`] as soon as the remaining undecided outcomes can
//! no longer bridge the gap to the threshold, which lets callers log early even
//! though the executor still waits for every outcome before finishing.
use super::{Evaluation, OperationStatus, Quorum, QuorumResult};
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct MinRequiredReplicas<T, E> {
    /// Outcomes not yet reported. Initially the size of the execution plan.
    remaining: usize,
    total: usize,
    /// Number of successes needed for the quorum to be met
    required_successes: usize,
    successes: Vec<T>,
    failures: Vec<E>,
    current_state: Evaluation,
}

impl<T, E> MinRequiredReplicas<T, E> {
    /// # Errors
    /// Returns [`Error::Logic`] if the threshold exceeds the number of outcomes
    /// that can ever be reported - such a quorum would be unreachable by construction.
    pub fn new(total: usize, required_successes: usize) -> Result<Self> {
        if total < required_successes {
            return Err(Error::Logic {
                reason: format!(
                    "a quorum of {} successes can never be met by {} outcomes",
                    required_successes, total
                ),
            });
        }

        Ok(Self {
            remaining: total,
            total,
            required_successes,
            successes: Default::default(),
            failures: Default::default(),
            current_state: Evaluation::NotReached,
        })
    }

    pub fn required_successes(&self) -> usize {
        self.required_successes
    }
}

impl<T, E> Quorum<T, E> for MinRequiredReplicas<T, E> {
    fn update(&mut self, operation_status: OperationStatus<T, E>) -> Result<Evaluation> {
        if self.remaining == 0 {
            return Err(Error::Logic {
                reason: "more outcomes reported than the quorum was sized for. This is a bug"
                    .to_string(),
            });
        }

        match operation_status {
            OperationStatus::Success(item) => {
                self.successes.push(item);
            }
            OperationStatus::Failure(err) => {
                self.failures.push(err);
            }
        }

        self.remaining -= 1;

        // an unreachable quorum can't become reachable again
        if self.current_state == Evaluation::Unreachable {
            return Ok(self.current_state);
        }

        self.current_state = if self.successes.len() >= self.required_successes {
            Evaluation::Reached
        } else if self.remaining + self.successes.len() < self.required_successes {
            Evaluation::Unreachable
        } else {
            Evaluation::NotReached
        };

        Ok(self.current_state)
    }

    fn finish(self) -> QuorumResult<T, E> {
        QuorumResult {
            evaluation: self.current_state,
            total: self.total,
            required: self.required_successes,
            successes: self.successes,
            failures: self.failures,
        }
    }
}
