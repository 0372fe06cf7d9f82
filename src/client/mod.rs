//! Client module - reaching workers.

mod capacity;
mod invoker;

pub use capacity::*;
pub use invoker::*;
