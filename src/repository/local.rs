//! # Local Connector
//!
//! Serves a directory on the local filesystem as every repository.
//! The URL is ignored; references are checked only when a set of known
//! references has been configured.

use super::{open_within, ConnectorError, RepositoryConnector, Worktree};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LocalConnector {
    base_path: PathBuf,
    known_references: Option<BTreeSet<String>>,
}

impl LocalConnector {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            known_references: None,
        }
    }

    /// Only accept the given references; anything else fails as unresolvable
    #[must_use]
    pub fn with_references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_references = Some(references.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl RepositoryConnector for LocalConnector {
    async fn checkout(
        &self,
        url: &str,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Worktree>, ConnectorError> {
        if cancel.is_cancelled() {
            return Err(ConnectorError::Cancelled);
        }
        if let Some(known) = &self.known_references {
            if !known.contains(reference) {
                return Err(ConnectorError::UnknownReference {
                    url: url.to_string(),
                    reference: reference.to_string(),
                });
            }
        }
        if !self.base_path.is_dir() {
            return Err(ConnectorError::Unreachable {
                url: url.to_string(),
                message: format!("{} is not a directory", self.base_path.display()),
            });
        }
        debug!(
            "Serving {} at {} from {}",
            url,
            reference,
            self.base_path.display()
        );
        Ok(Box::new(LocalWorktree {
            base_path: self.base_path.clone(),
        }))
    }
}

#[derive(Debug)]
struct LocalWorktree {
    base_path: PathBuf,
}

impl Worktree for LocalWorktree {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, ConnectorError> {
        open_within(&self.base_path, path)
    }
}
