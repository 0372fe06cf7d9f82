//! Worker module - sampler and request handler.

mod handler;
mod sampler;

pub use handler::*;
pub use sampler::*;
