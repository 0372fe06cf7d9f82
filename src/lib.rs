//! picompute - distributed Monte Carlo estimation of Pi.
//!
//! ## Architecture
//!
//! A coordinator splits the requested shots across `R` remote workers. Each
//! worker samples points in the unit square and reports in-circle counts per
//! report interval. The coordinator folds the counts into a running estimate
//! and repeats whole rounds until the estimate matches Pi to `D` digits or
//! the retry budget is spent.
//!
//! - **worker**: sampler and the worker-side request handler
//! - **client**: worker invocation (HTTP or in-process) and capacity providers
//! - **pool**: bounded-concurrency dispatch of one round
//! - **pipeline**: aggregation, precision check and the convergence controller
//! - **models**: configuration, records, errors and cost estimation

pub mod client;
pub mod models;
pub mod pipeline;
pub mod pool;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use client::{
    CapacityProvider, HttpInvoker, LocalInvoker, ServiceCapacity, WorkerInvoker, WorkerTarget,
};
pub use models::{
    AbortReason, AggregateRow, Config, CostEstimator, InvokeError, PiError, Result, RunReport,
    RunRequest, RunResult,
};
pub use pipeline::ConvergenceController;
pub use pool::Dispatcher;
