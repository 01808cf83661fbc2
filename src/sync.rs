//! Sync invoker - materializes manifest projects through the external repo tool
//!
//! The core only depends on the [`Syncer`] trait. [`RepoSync`] runs the
//! configured command once per batch, with every project path as an argument,
//! and lets the command write straight to the operator's terminal.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

use crate::config::SyncConfig;

/// Failure of a sync batch
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status} while syncing {}", .paths.join(" "))]
    Failed {
        command: String,
        status: ExitStatus,
        paths: Vec<String>,
    },
}

/// Outcome of the sync step of a run
#[derive(Debug)]
pub enum SyncStatus {
    /// Nothing was added, so nothing was synced
    NotNeeded,
    Completed { paths: Vec<String> },
    Failed(SyncError),
}

impl SyncStatus {
    pub fn from_result(paths: &[String], result: Result<(), SyncError>) -> Self {
        match result {
            Ok(()) => SyncStatus::Completed {
                paths: paths.to_vec(),
            },
            Err(error) => SyncStatus::Failed(error),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SyncStatus::Failed(_))
    }
}

/// Fetches or updates the working copies of manifest projects
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Syncer: Send + Sync {
    /// Sync all `paths` in a single invocation
    async fn sync(&self, paths: &[String]) -> Result<(), SyncError>;
}

/// [`Syncer`] backed by `repo sync --force-sync <paths>`
#[derive(Debug, Clone)]
pub struct RepoSync {
    command: String,
    args: Vec<String>,
    root: PathBuf,
}

impl RepoSync {
    /// Create a syncer running inside the checkout at `root`
    pub fn new(config: &SyncConfig, root: &Path) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            root: root.to_path_buf(),
        }
    }

    /// Command line as it will be run, for logging
    pub fn command_line(&self, paths: &[String]) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .chain(paths.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Syncer for RepoSync {
    async fn sync(&self, paths: &[String]) -> Result<(), SyncError> {
        info!("Running: {}", self.command_line(paths));

        let status = AsyncCommand::new(&self.command)
            .args(&self.args)
            .args(paths)
            .current_dir(&self.root)
            .status()
            .await
            .map_err(|source| SyncError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !status.success() {
            return Err(SyncError::Failed {
                command: self.command.clone(),
                status,
                paths: paths.to_vec(),
            });
        }

        debug!("Sync finished for {} project(s)", paths.len());
        Ok(())
    }
}
