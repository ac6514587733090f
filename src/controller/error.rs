//! # Reconciler Errors
//!
//! Every failure a reconcile pass can produce, classified into fatal errors
//! and requeue signals.
//!
//! Fatal errors move the resource to its failure state and are returned to
//! the scheduler. A requeue signal ([`ReconcilerError::NotReadyYet`]) means a
//! dependency has not converged yet: the state is kept and the pass is retried.

use crate::appconfig::ConfigFetchError;
use crate::manifest::{ParseError, RenderError};
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("failed to fetch application config: {0}")]
    ConfigFetch(#[source] ConfigFetchError),

    #[error("failed to render manifests: {0}")]
    Render(#[from] RenderError),

    #[error("failed to parse manifests: {0}")]
    Parse(#[from] ParseError),

    /// Concurrent modification of a target object; the next pass re-reads it
    #[error("apply conflict: {0}")]
    ApplyConflict(String),

    #[error("not ready yet: {0}")]
    NotReadyYet(String),

    #[error("child {kind} {namespace}/{name} no longer exists")]
    MissingChild {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("object store error: {0}")]
    Store(#[source] StoreError),

    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ReconcilerError {
    /// Requeue signals are retried without marking the resource failed
    pub fn is_requeue(&self) -> bool {
        matches!(self, Self::NotReadyYet(_))
    }

    /// Stable reason, used for conditions and metric labels
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ConfigFetch(_) => "ConfigFetchFailed",
            Self::Render(_) => "RenderFailed",
            Self::Parse(_) => "ParseFailed",
            Self::ApplyConflict(_) => "ApplyConflict",
            Self::NotReadyYet(_) => "Pending",
            Self::MissingChild { .. } => "MissingChild",
            Self::Store(_) => "StoreError",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl From<ConfigFetchError> for ReconcilerError {
    fn from(error: ConfigFetchError) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::ConfigFetch(error)
        }
    }
}

impl From<StoreError> for ReconcilerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { .. } => Self::ApplyConflict(error.to_string()),
            StoreError::Cancelled => Self::Cancelled,
            other => Self::Store(other),
        }
    }
}
