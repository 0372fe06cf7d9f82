//! Core data models for picompute.

mod config;
mod error;
mod pricing;
mod work;

pub use config::*;
pub use error::*;
pub use pricing::*;
pub use work::*;
