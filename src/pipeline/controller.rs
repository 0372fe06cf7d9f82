//! Convergence controller.
//!
//! Drives a run through explicit states:
//!
//! Initializing → RoundInProgress → (RoundInProgress)* → Converged | Aborted
//!
//! Every round is a full resample across all workers with fresh work unit
//! ids. Completed rounds append to the row history; a failed round leaves it
//! untouched. History is only ever changed between rounds, by this type.

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{WorkerInvoker, WorkerTarget};
use crate::models::{
    AbortReason, AggregateRow, BillingPolicy, CoordinatorConfig, CostEstimator, InvokeError,
    RunReport, RunRequest, RunResult, WorkUnit,
};
use crate::pipeline::{aggregate, has_converged, running_estimate};
use crate::pool::{Assignment, Dispatcher, RoundFailure};

/// What the run has accumulated so far.
#[derive(Debug, Clone, Default)]
struct RunHistory {
    rows: Vec<AggregateRow>,
    /// Rounds dispatched, failed ones included
    rounds: u32,
    failed_rounds: u32,
    /// Compute time counted towards duration and cost
    billed_secs: f64,
    last_failure: Option<InvokeError>,
}

#[derive(Debug)]
enum RunState {
    Initializing,
    RoundInProgress(RunHistory),
    Converged(RunHistory),
    Aborted(AbortReason),
}

/// Repeats distributed rounds until the estimate reaches the requested
/// precision or the retry budget runs out.
pub struct ConvergenceController<I> {
    dispatcher: Dispatcher<I>,
    settings: CoordinatorConfig,
    estimator: CostEstimator,
    progress: ProgressBar,
}

impl<I: WorkerInvoker> ConvergenceController<I> {
    pub fn new(invoker: Arc<I>, settings: CoordinatorConfig, estimator: CostEstimator) -> Self {
        Self {
            dispatcher: Dispatcher::new(invoker),
            settings,
            estimator,
            progress: ProgressBar::hidden(),
        }
    }

    /// Show a progress bar over rounds on stderr.
    pub fn with_progress(mut self) -> Self {
        let pb = ProgressBar::new(u64::from(self.settings.max_retries));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} round {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        self.progress = pb;
        self
    }

    /// Run to a terminal state.
    ///
    /// `available` are the workers the capacity provider reported; the first
    /// `worker_count` of them take one work unit each per round.
    ///
    /// K_i: rounds are strictly sequential, history changes only between them
    /// B_i(request is well formed, enough workers) → Aborted otherwise
    /// B_i(estimate reaches D digits within max_retries rounds) → Result
    pub async fn run(
        &self,
        request: &RunRequest,
        available: &[WorkerTarget],
    ) -> Result<RunReport, AbortReason> {
        let mut state = RunState::Initializing;

        loop {
            state = match state {
                RunState::Initializing => self.initialize(request, available),
                RunState::RoundInProgress(history) => {
                    self.run_round(request, available, history).await
                }
                RunState::Converged(history) => {
                    self.progress.finish_with_message("converged");
                    return Ok(self.finish(request, history));
                }
                RunState::Aborted(reason) => {
                    self.progress.abandon_with_message("aborted");
                    warn!(reason = %reason, "Run aborted");
                    return Err(reason);
                }
            };
        }
    }

    fn initialize(&self, request: &RunRequest, available: &[WorkerTarget]) -> RunState {
        let invalid = |msg: String| RunState::Aborted(AbortReason::InvalidRequest(msg));

        if request.service_kind != self.estimator.service_kind() {
            return invalid(format!(
                "service '{}' does not match the configured pricing for '{}'",
                request.service_kind,
                self.estimator.service_kind()
            ));
        }
        if request.worker_count < 1 {
            return invalid("worker count must be at least 1".to_string());
        }
        if request.total_shots < request.worker_count as u64 {
            return invalid(format!(
                "total shots ({}) must be at least the worker count ({})",
                request.total_shots, request.worker_count
            ));
        }
        if request.report_interval < 1 {
            return invalid("report interval must be at least 1".to_string());
        }
        if request.subshot_count() < request.report_interval {
            return invalid(format!(
                "each worker would sample {} shots, fewer than one report interval of {}",
                request.subshot_count(),
                request.report_interval
            ));
        }

        if available.len() < request.worker_count {
            return RunState::Aborted(AbortReason::InsufficientResources {
                requested: request.worker_count,
                available: available.len(),
            });
        }

        info!(
            service = %request.service_kind,
            workers = request.worker_count,
            digits = request.precision_digits,
            shots = request.total_shots,
            interval = request.report_interval,
            max_rounds = self.settings.max_retries,
            "Starting run"
        );

        RunState::RoundInProgress(RunHistory::default())
    }

    async fn run_round(
        &self,
        request: &RunRequest,
        available: &[WorkerTarget],
        history: RunHistory,
    ) -> RunState {
        let round = history.rounds + 1;
        let subshots = request.subshot_count();

        let assignments: Vec<Assignment> = available
            .iter()
            .take(request.worker_count)
            .map(|target| Assignment {
                unit: WorkUnit::new(subshots, request.report_interval, round),
                target: target.clone(),
            })
            .collect();

        debug!(round = round, subshots = subshots, "Dispatching round");

        let history = match self
            .dispatcher
            .dispatch_round(assignments, request.worker_count)
            .await
        {
            Ok(outcomes) => {
                let elapsed: f64 = outcomes.iter().map(|o| o.elapsed_secs).sum();
                let rows = aggregate(history.rows, &outcomes);
                RunHistory {
                    rows,
                    rounds: round,
                    billed_secs: history.billed_secs + elapsed,
                    last_failure: None,
                    ..history
                }
            }
            Err(failure) => self.record_failure(round, history, failure),
        };

        let estimate = match &history.last_failure {
            Some(_) => None,
            None => running_estimate(&history.rows),
        };

        self.progress.set_position(u64::from(round));
        if let Some(estimate) = estimate {
            self.progress.set_message(format!("estimate {estimate:.10}"));
            info!(
                round = round,
                rows = history.rows.len(),
                estimate = estimate,
                "Round complete"
            );

            if has_converged(estimate, request.precision_digits, self.settings.rounding) {
                return RunState::Converged(history);
            }
        }

        if round < self.settings.max_retries {
            RunState::RoundInProgress(history)
        } else {
            RunState::Aborted(AbortReason::ExhaustedRetries {
                rounds: round,
                last_estimate: running_estimate(&history.rows),
                last_failure: history.last_failure,
            })
        }
    }

    fn record_failure(&self, round: u32, history: RunHistory, failure: RoundFailure) -> RunHistory {
        warn!(
            round = round,
            failed_units = failure.failed_units,
            kind = failure.cause.kind(),
            error = %failure.cause,
            "Round failed, partials discarded"
        );

        let billed = match self.settings.billing {
            BillingPolicy::AllAttempts => failure.discarded_secs,
            BillingPolicy::CompletedRounds => 0.0,
        };

        RunHistory {
            rounds: round,
            failed_rounds: history.failed_rounds + 1,
            billed_secs: history.billed_secs + billed,
            last_failure: Some(failure.cause),
            ..history
        }
    }

    fn finish(&self, request: &RunRequest, history: RunHistory) -> RunReport {
        let estimated_pi = running_estimate(&history.rows).unwrap_or(0.0);
        let total_cost = self.estimator.estimate_cost(history.billed_secs);

        let result = RunResult {
            timestamp: Utc::now(),
            estimated_pi,
            total_duration_secs: history.billed_secs,
            total_cost,
            rounds_used: history.rounds,
            failed_rounds: history.failed_rounds,
            service_kind: request.service_kind.clone(),
            shots_requested: request.total_shots,
            report_interval: request.report_interval,
            worker_count: request.worker_count,
            precision_digits: request.precision_digits,
        };

        info!(
            estimate = result.estimated_pi,
            rounds = result.rounds_used,
            failed_rounds = result.failed_rounds,
            duration_secs = result.total_duration_secs,
            cost = format!("${:.8}", result.total_cost),
            "Run converged"
        );

        RunReport {
            result,
            rows: history.rows,
        }
    }
}
