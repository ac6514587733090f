//! # Runtime Module
//!
//! Runtime components for the Portal Controller, including initialization,
//! watch loop, and error handling.

pub mod backoff;
pub mod context;
pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use backoff::{BackoffState, FibonacciBackoff};
pub use context::Context;
pub use error_policy::*;
pub use initialization::*;
pub use watch_loop::*;
