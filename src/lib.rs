//! # Portal Controller
//!
//! A Kubernetes controller that turns a Git-hosted application configuration
//! into running, per-stage deployments.
//!
//! ## Overview
//!
//! Three resources are reconciled, each with an explicit state machine in its
//! persisted status:
//!
//! 1. **Application** - fetches the AppConfig and fans out into one Release per stage
//! 2. **Release** - renders the application bundle from the AppConfig and applies it
//! 3. **Portal** - provisions a tenant namespace and the portal UI inside it
//!
//! Reconciliation is level-triggered: every pass re-fetches the configuration,
//! re-renders and re-applies, so repeated passes converge on the same state.

pub mod appconfig;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod manifest;
pub mod observability;
pub mod repository;
pub mod runtime;
pub mod store;
