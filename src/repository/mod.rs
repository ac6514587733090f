//! # Repository Connector
//!
//! Fetches a named reference of a remote source repository and exposes
//! read access to the files inside it.
//!
//! - [`GitConnector`] shells out to the `git` CLI and checks out into a temporary directory
//! - [`LocalConnector`] serves a local directory, for tests and air-gapped setups

mod git;
mod local;

pub use git::GitConnector;
pub use local::LocalConnector;

use async_trait::async_trait;
use std::fmt;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised while fetching a repository or opening files in it
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("repository {url} is unreachable: {message}")]
    Unreachable { url: String, message: String },

    #[error("reference {reference:?} could not be resolved in {url}")]
    UnknownReference { url: String, reference: String },

    #[error("file {path} not found in worktree")]
    NotFound { path: String },

    #[error("path {path} escapes the worktree")]
    InvalidPath { path: String },

    #[error("repository operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A checked-out tree of a repository at a single reference
pub trait Worktree: Send + Sync + fmt::Debug {
    /// Open a file relative to the worktree root
    ///
    /// Fails with [`ConnectorError::NotFound`] when the path is absent.
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, ConnectorError>;
}

/// Fetches repository references
///
/// Implementations must accept both branch names and raw commit ids as `reference`.
#[async_trait]
pub trait RepositoryConnector: Send + Sync + fmt::Debug {
    async fn checkout(
        &self,
        url: &str,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Worktree>, ConnectorError>;
}

/// Join a repository-relative path onto a worktree root
///
/// Absolute paths and parent-directory components are rejected.
pub(crate) fn resolve_within(root: &Path, path: &str) -> Result<PathBuf, ConnectorError> {
    let relative = Path::new(path);
    let escapes = relative.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes || path.is_empty() {
        return Err(ConnectorError::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(root.join(relative))
}

/// Open a file below `root`, mapping a missing file to [`ConnectorError::NotFound`]
pub(crate) fn open_within(root: &Path, path: &str) -> Result<Box<dyn Read + Send>, ConnectorError> {
    let full = resolve_within(root, path)?;
    match std::fs::File::open(&full) {
        Ok(file) if full.is_file() => Ok(Box::new(file)),
        Ok(_) => Err(ConnectorError::NotFound {
            path: path.to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConnectorError::NotFound {
            path: path.to_string(),
        }),
        Err(e) => Err(ConnectorError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_within_rejects_escapes() {
        let root = Path::new("/work/tree");
        assert!(matches!(
            resolve_within(root, "../etc/passwd"),
            Err(ConnectorError::InvalidPath { .. })
        ));
        assert!(matches!(
            resolve_within(root, "/etc/passwd"),
            Err(ConnectorError::InvalidPath { .. })
        ));
        assert_eq!(
            resolve_within(root, "deploy/appconfig.yaml").unwrap(),
            PathBuf::from("/work/tree/deploy/appconfig.yaml")
        );
    }

    #[test]
    fn test_open_within_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let Err(err) = open_within(dir.path(), "appconfig.yaml") else {
            panic!("expected open_within to fail for a missing file");
        };
        assert!(matches!(err, ConnectorError::NotFound { path } if path == "appconfig.yaml"));
    }
}
