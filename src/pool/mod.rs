//! Pool module - concurrent dispatch of work units.

mod dispatcher;

pub use dispatcher::*;
