//! # Controller
//!
//! Reconciliation engine for Applications, Releases and Portals.
//!
//! ## Sub-modules
//!
//! - `state_machine` - Generic normalize → dispatch → persist driver
//! - `error` - Reconciler errors and requeue classification
//! - `status` - Condition bookkeeping
//! - `release` - Release reconciler (fetch → render → parse → apply)
//! - `application` - Application reconciler (fan-out into Releases, readiness aggregation)
//! - `portal` - Portal reconciler (namespace, UI bundle, pod readiness)

pub mod application;
pub mod error;
pub mod portal;
pub mod release;
pub mod state_machine;
pub mod status;

pub use application::{release_name, ApplicationReconciler};
pub use error::ReconcilerError;
pub use portal::{all_pods_running, PortalReconciler};
pub use release::{release_reference, ReleaseReconciler};
pub use state_machine::{drive, handle_error, Outcome, StateMachine};
pub use status::{find_condition, set_condition, READY_CONDITION};
