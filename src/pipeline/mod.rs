//! Pipeline module - aggregation and the convergence loop.

mod aggregator;
mod controller;
mod convergence;

pub use aggregator::*;
pub use controller::*;
pub use convergence::*;
