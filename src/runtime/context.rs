//! # Controller Context
//!
//! Shared state handed to every reconcile call by the scheduler.

use super::backoff::BackoffState;
use crate::config::ControllerConfig;
use crate::controller::{ApplicationReconciler, PortalReconciler, ReleaseReconciler};
use crate::repository::RepositoryConnector;
use crate::store::ObjectStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

pub struct Context {
    pub store: Arc<dyn ObjectStore>,
    pub applications: ApplicationReconciler,
    pub releases: ReleaseReconciler,
    pub portals: PortalReconciler,
    pub config: ControllerConfig,
    /// Parent of every reconcile pass's cancellation token
    pub shutdown: CancellationToken,
    /// Per-resource error backoff, keyed by `Kind/namespace/name`
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        connector: Arc<dyn RepositoryConnector>,
        config: ControllerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            applications: ApplicationReconciler::new(
                Arc::clone(&connector),
                config.default_branch.clone(),
            ),
            releases: ReleaseReconciler::new(connector, config.application_bundle_path()),
            portals: PortalReconciler::new(config.portal_bundle_path()),
            config,
            shutdown,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Record an error for `key` and return the delay before the next attempt
    /// together with the consecutive error count
    pub fn next_error_backoff(&self, key: &str) -> (u64, u32) {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(key.to_string()).or_insert_with(|| {
            BackoffState::new(
                self.config.error_backoff_min_secs,
                self.config.error_backoff_max_secs,
            )
        });
        state.increment_error();
        (state.backoff.next_backoff_seconds(), state.error_count)
    }

    /// Forget the error history of `key` after a successful pass
    pub fn reset_backoff(&self, key: &str) {
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
