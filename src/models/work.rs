//! Work and result records that flow through a run.
//!
//! WorkUnit → (worker) → PartialResult* → RoundOutcome → AggregateRow* → RunResult

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use super::{PiError, Result};

/// Accepted range for the number of parallel workers.
pub const WORKER_COUNT_RANGE: (usize, usize) = (1, 10);
/// Accepted range for the number of matching digits.
pub const PRECISION_DIGITS_RANGE: (u32, u32) = (1, 10);
/// Accepted range for the total number of shots.
pub const TOTAL_SHOTS_RANGE: (u64, u64) = (1_000, 10_000_000);
/// Smallest accepted report interval.
pub const MIN_REPORT_INTERVAL: u64 = 1_000;

/// One worker's share of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Points this worker draws
    pub subshot_count: u64,
    /// Points per reported partial
    pub report_interval: u64,
    /// Unique per unit and per round
    pub work_unit_id: String,
    /// Round this unit belongs to (coordinator side only, never sent)
    pub round: u32,
}

impl WorkUnit {
    /// Create a unit with a fresh id.
    pub fn new(subshot_count: u64, report_interval: u64, round: u32) -> Self {
        Self {
            subshot_count,
            report_interval,
            work_unit_id: Uuid::new_v4().to_string(),
            round,
        }
    }

    /// Shots covered by complete report intervals.
    pub fn reported_shots(&self) -> u64 {
        if self.report_interval == 0 {
            return 0;
        }
        self.subshot_count / self.report_interval * self.report_interval
    }
}

/// In-circle count for one report interval of one work unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResult {
    #[serde(rename = "resource_id")]
    pub work_unit_id: String,
    pub in_circle: u64,
    pub shots: u64,
}

/// Everything one successful invocation brought back.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    pub work_unit_id: String,
    pub partials: Vec<PartialResult>,
    /// Compute time reported by the worker
    pub elapsed_secs: f64,
}

/// One row of the running estimate table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    /// 1-based position in the whole run
    pub sequence_number: usize,
    pub work_unit_id: String,
    pub in_circle: u64,
    pub shots: u64,
    pub cumulative_in_circle: u64,
    pub cumulative_shots: u64,
    /// cumulative_in_circle / cumulative_shots * 4
    pub running_pi_estimate: f64,
}

/// Parameters of one run, as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub service_kind: String,
    /// R
    pub worker_count: usize,
    /// D
    pub precision_digits: u32,
    /// S
    pub total_shots: u64,
    /// Q
    pub report_interval: u64,
}

impl RunRequest {
    /// Check the request against the accepted input ranges.
    pub fn validate(&self) -> Result<()> {
        let (min_r, max_r) = WORKER_COUNT_RANGE;
        if !(min_r..=max_r).contains(&self.worker_count) {
            return Err(PiError::InvalidRequest(format!(
                "worker count must be between {min_r} and {max_r}, got {}",
                self.worker_count
            )));
        }

        let (min_d, max_d) = PRECISION_DIGITS_RANGE;
        if !(min_d..=max_d).contains(&self.precision_digits) {
            return Err(PiError::InvalidRequest(format!(
                "precision digits must be between {min_d} and {max_d}, got {}",
                self.precision_digits
            )));
        }

        let (min_s, max_s) = TOTAL_SHOTS_RANGE;
        if !(min_s..=max_s).contains(&self.total_shots) {
            return Err(PiError::InvalidRequest(format!(
                "total shots must be between {min_s} and {max_s}, got {}",
                self.total_shots
            )));
        }

        if self.report_interval < MIN_REPORT_INTERVAL {
            return Err(PiError::InvalidRequest(format!(
                "report interval must be at least {MIN_REPORT_INTERVAL}, got {}",
                self.report_interval
            )));
        }

        Ok(())
    }

    /// Shots per worker. The remainder of the division is never sampled.
    pub fn subshot_count(&self) -> u64 {
        if self.worker_count == 0 {
            return 0;
        }
        self.total_shots / self.worker_count as u64
    }
}

/// Final record of a converged run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub timestamp: DateTime<Utc>,
    pub estimated_pi: f64,
    pub total_duration_secs: f64,
    pub total_cost: f64,
    pub rounds_used: u32,
    pub failed_rounds: u32,
    pub service_kind: String,
    pub shots_requested: u64,
    pub report_interval: u64,
    pub worker_count: usize,
    pub precision_digits: u32,
}

impl RunResult {
    /// Copy with the real-valued figures rounded to `dp` decimal places.
    pub fn rounded(&self, dp: u32) -> Self {
        let round = |v: f64| {
            let factor = 10f64.powi(dp as i32);
            (v * factor).round() / factor
        };
        Self {
            estimated_pi: round(self.estimated_pi),
            total_duration_secs: round(self.total_duration_secs),
            total_cost: round(self.total_cost),
            ..self.clone()
        }
    }
}

/// What a converged run hands back: the result plus the full row history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub result: RunResult,
    pub rows: Vec<AggregateRow>,
}

impl RunReport {
    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| PiError::io("writing run report", e))
    }
}
