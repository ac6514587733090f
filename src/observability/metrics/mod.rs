//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `controller_metrics` - Reconciliation metrics (passes, errors, durations, requeues)
//! - `pipeline_metrics` - Repository fetch and apply metrics

pub mod controller_metrics;
pub mod pipeline_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use pipeline_metrics::*;
pub use registry::*;
