//! Round dispatcher.
//!
//! Fans a round's work units out to the invoker, at most `max_concurrency`
//! in flight, and waits for every one of them before answering. A single
//! failed unit fails the whole round.
//!
//! Epistemic foundation:
//! - K_i: Each worker slot holds at most one work unit per round
//! - K_i: Units run in parallel up to the semaphore bound
//! - B_i: Each invocation may succeed or fail → Result

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::client::{WorkerInvoker, WorkerTarget};
use crate::models::{InvokeError, RoundOutcome, WorkUnit};

/// A work unit bound to the worker that will run it.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub unit: WorkUnit,
    pub target: WorkerTarget,
}

/// Why a round produced no usable outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundFailure {
    /// First failure observed, in completion order
    pub cause: InvokeError,
    /// How many units failed
    pub failed_units: usize,
    /// Compute time of the units that did succeed (their partials are dropped)
    pub discarded_secs: f64,
}

/// Runs rounds of work units against a shared invoker.
pub struct Dispatcher<I> {
    invoker: Arc<I>,
}

impl<I: WorkerInvoker> Dispatcher<I> {
    pub fn new(invoker: Arc<I>) -> Self {
        Self { invoker }
    }

    /// Run every assignment and collect the outcomes.
    ///
    /// Siblings of a failed unit are not cancelled; they finish and their
    /// results are discarded. Outcomes come back in completion order.
    ///
    /// B_i(every unit succeeds) → Ok(outcomes)
    /// B_i(any unit fails) → Err(RoundFailure) with the first cause
    pub async fn dispatch_round(
        &self,
        assignments: Vec<Assignment>,
        max_concurrency: usize,
    ) -> Result<Vec<RoundOutcome>, RoundFailure> {
        debug_assert!(
            {
                let mut slots = HashSet::new();
                assignments.iter().all(|a| slots.insert(a.target.slot))
            },
            "two work units assigned to the same worker slot"
        );

        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let units = assignments.len();

        for Assignment { unit, target } in assignments {
            let invoker = Arc::clone(&self.invoker);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => invoker.invoke(&unit, &target).await,
                    Err(_) => Err(InvokeError::TaskFailed("semaphore closed".to_string())),
                };
                (unit.work_unit_id, target.slot, result)
            });
        }

        let mut outcomes = Vec::with_capacity(units);
        let mut first_failure: Option<InvokeError> = None;
        let mut failed_units = 0;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, _, Ok(outcome))) => outcomes.push(outcome),
                Ok((work_unit, slot, Err(e))) => {
                    warn!(
                        slot = slot,
                        work_unit = %work_unit,
                        kind = e.kind(),
                        error = %e,
                        "Invocation failed"
                    );
                    failed_units += 1;
                    first_failure.get_or_insert(e);
                }
                Err(e) => {
                    warn!(error = %e, "Invocation task panicked");
                    failed_units += 1;
                    first_failure.get_or_insert(InvokeError::TaskFailed(e.to_string()));
                }
            }
        }

        match first_failure {
            None => {
                debug!(units = units, "Round complete");
                Ok(outcomes)
            }
            Some(cause) => Err(RoundFailure {
                cause,
                failed_units,
                discarded_secs: outcomes.iter().map(|o| o.elapsed_secs).sum(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Scripted, ScriptedInvoker};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn assignments(n: usize, subshots: u64) -> Vec<Assignment> {
        (0..n)
            .map(|slot| Assignment {
                unit: WorkUnit::new(subshots, 1_000, 1),
                target: WorkerTarget::local(slot),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_all_units_succeed() {
        let invoker = Arc::new(ScriptedInvoker::new(|_, _| Scripted::ok(785, 0.5)));
        let dispatcher = Dispatcher::new(Arc::clone(&invoker));

        let outcomes = dispatcher
            .dispatch_round(assignments(3, 2_000), 3)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.partials.len() == 2));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_one_failure_fails_round_without_short_circuit() {
        let invoker = Arc::new(
            ScriptedInvoker::new(|_, target| {
                if target.slot == 1 {
                    Scripted::Fail(InvokeError::Transport("connection refused".into()))
                } else {
                    Scripted::ok(785, 0.25)
                }
            })
            .with_delay(Duration::from_millis(5)),
        );
        let dispatcher = Dispatcher::new(Arc::clone(&invoker));

        let failure = dispatcher
            .dispatch_round(assignments(4, 1_000), 4)
            .await
            .unwrap_err();

        assert_eq!(
            failure.cause,
            InvokeError::Transport("connection refused".into())
        );
        assert_eq!(failure.failed_units, 1);
        assert_eq!(failure.discarded_secs, 0.75);
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let invoker = Arc::new(
            ScriptedInvoker::new(|_, _| Scripted::ok(785, 0.1))
                .with_delay(Duration::from_millis(20)),
        );
        let dispatcher = Dispatcher::new(Arc::clone(&invoker));

        dispatcher
            .dispatch_round(assignments(6, 1_000), 2)
            .await
            .unwrap();

        assert_eq!(invoker.calls.load(Ordering::SeqCst), 6);
        assert!(invoker.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_round() {
        let invoker = Arc::new(ScriptedInvoker::new(|_, _| Scripted::ok(785, 0.1)));
        let dispatcher = Dispatcher::new(invoker);
        assert!(dispatcher.dispatch_round(Vec::new(), 1).await.unwrap().is_empty());
    }
}
