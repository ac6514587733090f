//! # Git Connector
//!
//! Clones repositories with the `git` CLI.
//!
//! A shallow clone of the reference is tried first, which works for branch and
//! tag names. When that fails (commit SHAs), a deeper clone is made and the
//! reference is fetched and checked out explicitly.

use super::{open_within, ConnectorError, RepositoryConnector, Worktree};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Depth of the fallback clone used to reach pinned commits
const FALLBACK_CLONE_DEPTH: &str = "50";

/// Connector backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitConnector {
    git_binary: PathBuf,
    work_root: Option<PathBuf>,
}

impl Default for GitConnector {
    fn default() -> Self {
        Self {
            git_binary: PathBuf::from("git"),
            work_root: None,
        }
    }
}

impl GitConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create worktrees below `root` instead of the system temp directory
    #[must_use]
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    fn temp_dir(&self) -> std::io::Result<TempDir> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("portal-repo-");
            b
        };
        match &self.work_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }

    /// Run git, killing the child process if `cancel` fires first
    async fn run<I, S>(
        &self,
        url: &str,
        args: I,
        cwd: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<std::process::Output, ConnectorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.git_binary);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.output();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ConnectorError::Cancelled),
            output = child => output.map_err(|e| ConnectorError::Unreachable {
                url: url.to_string(),
                message: format!("failed to execute git: {e}"),
            }),
        }
    }

    async fn clone_reference(
        &self,
        url: &str,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<GitWorktree, ConnectorError> {
        let dir = self.temp_dir()?;
        let checkout = dir.path().join("checkout");

        let shallow = self
            .run(
                url,
                [
                    OsStr::new("clone"),
                    OsStr::new("--depth"),
                    OsStr::new("1"),
                    OsStr::new("--branch"),
                    OsStr::new(reference),
                    OsStr::new(url),
                    checkout.as_os_str(),
                ],
                None,
                cancel,
            )
            .await?;

        if shallow.status.success() {
            return Ok(GitWorktree { dir, checkout });
        }

        debug!(
            "Shallow clone of {} at {} failed, falling back to fetch: {}",
            url,
            reference,
            String::from_utf8_lossy(&shallow.stderr).trim()
        );
        if checkout.exists() {
            tokio::fs::remove_dir_all(&checkout).await?;
        }

        let deep = self
            .run(
                url,
                [
                    OsStr::new("clone"),
                    OsStr::new("--depth"),
                    OsStr::new(FALLBACK_CLONE_DEPTH),
                    OsStr::new(url),
                    checkout.as_os_str(),
                ],
                None,
                cancel,
            )
            .await?;
        if !deep.status.success() {
            return Err(ConnectorError::Unreachable {
                url: url.to_string(),
                message: String::from_utf8_lossy(&deep.stderr).trim().to_string(),
            });
        }

        // Best effort: the commit may already be inside the fetched depth
        let fetch = self
            .run(
                url,
                ["fetch", "--depth", "1", "origin", reference],
                Some(checkout.as_path()),
                cancel,
            )
            .await?;
        if !fetch.status.success() {
            warn!(
                "git fetch of {} failed, trying checkout from existing history: {}",
                reference,
                String::from_utf8_lossy(&fetch.stderr).trim()
            );
        }

        let switch = self
            .run(
                url,
                ["-c", "advice.detachedHead=false", "checkout", reference],
                Some(checkout.as_path()),
                cancel,
            )
            .await?;
        if !switch.status.success() {
            return Err(ConnectorError::UnknownReference {
                url: url.to_string(),
                reference: reference.to_string(),
            });
        }

        Ok(GitWorktree { dir, checkout })
    }
}

#[async_trait]
impl RepositoryConnector for GitConnector {
    async fn checkout(
        &self,
        url: &str,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Worktree>, ConnectorError> {
        let span = info_span!("git.clone", repository.url = url, revision = reference);
        let start = Instant::now();

        async move {
            info!("Cloning repository {} (revision: {})", url, reference);
            let worktree = self.clone_reference(url, reference, cancel).await?;
            info!(
                "✅ Cloned {} at {} in {:.2}s",
                url,
                reference,
                start.elapsed().as_secs_f64()
            );
            Ok(Box::new(worktree) as Box<dyn Worktree>)
        }
        .instrument(span)
        .await
    }
}

/// A cloned repository; the directory is removed when dropped
#[derive(Debug)]
struct GitWorktree {
    #[allow(dead_code, reason = "Held so the checkout is removed on drop")]
    dir: TempDir,
    checkout: PathBuf,
}

impl Worktree for GitWorktree {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, ConnectorError> {
        open_within(&self.checkout, path)
    }
}
