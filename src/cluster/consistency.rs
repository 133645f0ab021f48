//! The consistency execution protocol: fan-out, bounded per-node retry, and
//! ONE/QUORUM/ALL aggregation.
//!
//! [`execute`] is the single source of truth for consistency semantics. Given
//! an execution plan and a per-node callback it:
//!  1. invokes the callback against every node in parallel,
//!  2. retries each node sequentially up to the retry budget (attempt N+1 only
//!     starts after attempt N completed - no busy waiting, no recursion),
//!  3. waits for every node's final outcome (a barrier join, not a
//!     race-to-first-quorum),
//!  4. aggregates through [`MinRequiredReplicas`] with the threshold derived
//!     from the [`ConsistencyLevel`].
//!
//! An unmet threshold is a normal, reportable [`ConsistencyOutcome`] - only an
//! empty execution plan (a configuration bug) surfaces as an [`Error`].
use futures::{stream::FuturesUnordered, Future, StreamExt};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::{event, Level};

use super::node::Node;
use super::quorum::{
    min_required_replicas::MinRequiredReplicas, Evaluation, OperationStatus, Quorum,
};
use crate::error::{Error, Result};

/// How many times a node is re-contacted after a failed attempt.
pub const DEFAULT_RETRY_BUDGET: usize = 1;

/// The replica-acknowledgment guarantee requested for an operation.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ConsistencyLevel {
    /// At least one node must acknowledge
    One,
    /// A majority (floor(N/2) + 1) of the plan must acknowledge
    #[default]
    Quorum,
    /// Every node in the plan must acknowledge
    All,
}

impl ConsistencyLevel {
    /// The success threshold this level requires out of a plan of `plan_size` nodes.
    pub fn required_successes(&self, plan_size: usize) -> usize {
        match self {
            ConsistencyLevel::One => 1,
            ConsistencyLevel::Quorum => plan_size / 2 + 1,
            ConsistencyLevel::All => plan_size,
        }
    }
}

/// Aggregated result of one protocol execution.
///
/// `satisfied == false` means the threshold was not met - a normal outcome
/// under partial failure, distinct from the [`Error`]s [`execute`] can return.
#[derive(Debug)]
pub struct ConsistencyOutcome {
    pub satisfied: bool,
    pub level: ConsistencyLevel,
    /// Threshold the level required for this plan
    pub required: usize,
    /// Number of nodes whose final outcome was success
    pub successes: usize,
    /// Terminal per-node failures, after each node exhausted its retry budget
    pub failures: Vec<Error>,
}

/// Runs `callback` against every node of `plan` and aggregates per `level`.
///
/// Each node gets its own retry counter initialized from `retry_budget`: a
/// callback returning `Ok(false)` or `Err` consumes one retry; once the counter
/// hits zero the node's outcome is finalized as a failure. Retries against one
/// node are strictly sequential; nodes progress independently of each other.
///
/// # Errors
/// [`Error::EmptyExecutionPlan`] when `plan` has no nodes.
pub async fn execute<F, Fut>(
    plan: Vec<Node>,
    level: ConsistencyLevel,
    retry_budget: usize,
    callback: F,
) -> Result<ConsistencyOutcome>
where
    F: Fn(Node) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    if plan.is_empty() {
        return Err(Error::EmptyExecutionPlan);
    }

    let required = level.required_successes(plan.len());
    let mut quorum = MinRequiredReplicas::new(plan.len(), required)?;

    let mut attempts = FuturesUnordered::new();
    for node in plan {
        attempts.push(run_with_retries(node, retry_budget, &callback));
    }

    // barrier join: aggregation only looks at finalized outcomes
    while let Some((node, outcome)) = attempts.next().await {
        let evaluation = match outcome {
            Ok(()) => quorum.update(OperationStatus::Success(node.id.clone()))?,
            Err(err) => {
                event!(
                    Level::WARN,
                    "node {} finalized as failure: {:?}",
                    node.id,
                    err
                );
                quorum.update(OperationStatus::Failure(err))?
            }
        };

        if evaluation == Evaluation::Unreachable {
            event!(Level::DEBUG, "{} threshold already unreachable", level);
        }
    }

    let result = quorum.finish();
    Ok(ConsistencyOutcome {
        satisfied: result.evaluation == Evaluation::Reached,
        level,
        required: result.required,
        successes: result.successes.len(),
        failures: result.failures,
    })
}

/// One node's attempt loop. Sequential by construction: the next attempt is
/// only scheduled once the previous one resolved.
async fn run_with_retries<F, Fut>(
    node: Node,
    retry_budget: usize,
    callback: &F,
) -> (Node, Result<()>)
where
    F: Fn(Node) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let mut remaining = retry_budget;
    loop {
        let failure = match callback(node.clone()).await {
            Ok(true) => return (node, Ok(())),
            Ok(false) => Error::Transport {
                reason: format!("node {} did not acknowledge the operation", node.id),
            },
            Err(err) => err,
        };

        if remaining == 0 {
            return (node, Err(failure));
        }

        remaining -= 1;
        event!(
            Level::DEBUG,
            "retrying against node {} ({} retries left)",
            node.id,
            remaining
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::node::NodeId;
    use bytes::Bytes;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn plan(n: usize) -> Vec<Node> {
        (0..n)
            .map(|i| {
                Node::new(
                    NodeId::new(format!("node-{}", i)),
                    Bytes::from(format!("127.0.0.1:{}", 3000 + i)),
                )
            })
            .collect()
    }

    /// Succeeds for the first `n_good` nodes of the plan, fails for the rest
    fn split_callback(
        n_good: usize,
    ) -> impl Fn(Node) -> std::pin::Pin<Box<dyn futures::Future<Output = Result<bool>>>> {
        move |node: Node| {
            let good: Vec<NodeId> = (0..n_good)
                .map(|i| NodeId::new(format!("node-{}", i)))
                .collect();
            Box::pin(async move { Ok(good.contains(&node.id)) })
        }
    }

    #[tokio::test]
    async fn test_quorum_met_with_three_of_five() {
        let outcome = execute(plan(5), ConsistencyLevel::Quorum, 0, split_callback(3))
            .await
            .unwrap();

        assert!(outcome.satisfied);
        assert_eq!(outcome.required, 3);
        assert_eq!(outcome.successes, 3);
        assert_eq!(outcome.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_quorum_not_met_with_two_of_five() {
        let outcome = execute(plan(5), ConsistencyLevel::Quorum, 0, split_callback(2))
            .await
            .unwrap();

        assert!(!outcome.satisfied);
        assert_eq!(outcome.successes, 2);
        assert_eq!(outcome.failures.len(), 3);
    }

    #[tokio::test]
    async fn test_all_fails_on_any_single_failure() {
        let outcome = execute(plan(3), ConsistencyLevel::All, 0, split_callback(2))
            .await
            .unwrap();
        assert!(!outcome.satisfied);

        let outcome = execute(plan(3), ConsistencyLevel::All, 0, split_callback(3))
            .await
            .unwrap();
        assert!(outcome.satisfied);
        assert_eq!(outcome.required, 3);
    }

    #[tokio::test]
    async fn test_one_succeeds_with_a_single_ack() {
        let outcome = execute(plan(4), ConsistencyLevel::One, 0, split_callback(1))
            .await
            .unwrap();
        assert!(outcome.satisfied);
        assert_eq!(outcome.required, 1);

        let outcome = execute(plan(4), ConsistencyLevel::One, 0, split_callback(0))
            .await
            .unwrap();
        assert!(!outcome.satisfied);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_attempt_count() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let outcome = {
            let attempts = attempts.clone();
            execute(plan(1), ConsistencyLevel::One, 2, move |_| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Ok(false)
                }
            })
            .await
            .unwrap()
        };

        // initial attempt + 2 retries
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(!outcome.satisfied);
        assert_eq!(outcome.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let outcome = {
            let attempts = attempts.clone();
            execute(plan(1), ConsistencyLevel::All, 1, move |_| {
                let attempts = attempts.clone();
                async move {
                    // first attempt fails, the retry succeeds
                    Ok(attempts.fetch_add(1, Ordering::SeqCst) > 0)
                }
            })
            .await
            .unwrap()
        };

        assert!(outcome.satisfied);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_callback_errors_count_as_failures() {
        let outcome = execute(plan(2), ConsistencyLevel::All, 0, |node| async move {
            if node.id == NodeId::from("node-0") {
                Ok(true)
            } else {
                Err(Error::Io {
                    reason: "connection reset".to_string(),
                })
            }
        })
        .await
        .unwrap();

        assert!(!outcome.satisfied);
        assert_eq!(outcome.successes, 1);
        assert_eq!(outcome.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_plan_is_a_config_error() {
        let err = execute(Vec::new(), ConsistencyLevel::Quorum, 1, |_| async {
            Ok(true)
        })
        .await
        .err()
        .unwrap();

        assert!(matches!(err, Error::EmptyExecutionPlan));
    }

    #[test]
    fn test_required_successes_table() {
        assert_eq!(ConsistencyLevel::One.required_successes(5), 1);
        assert_eq!(ConsistencyLevel::Quorum.required_successes(5), 3);
        assert_eq!(ConsistencyLevel::Quorum.required_successes(4), 3);
        assert_eq!(ConsistencyLevel::Quorum.required_successes(1), 1);
        assert_eq!(ConsistencyLevel::All.required_successes(5), 5);
    }

    #[test]
    fn test_level_parse_and_display() {
        use std::str::FromStr;
        assert_eq!(
            ConsistencyLevel::from_str("QUORUM").unwrap(),
            ConsistencyLevel::Quorum
        );
        assert_eq!(ConsistencyLevel::All.to_string(), "ALL");
        assert_eq!(ConsistencyLevel::default(), ConsistencyLevel::Quorum);
    }
}
