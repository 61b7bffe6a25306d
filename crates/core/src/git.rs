//! Source fetching
//!
//! Clones and refreshes working copies through the [`CommandRunner`]. Calls
//! are never retried; a non-zero exit surfaces as [`GitError::Fetch`] with
//! the tool's exit code and stderr. Callers serialize access per target
//! directory.

use crate::errors::{GitError, ProcessError};
use crate::process::{CommandRunner, RunOptions};
use crate::reference::RepositoryReference;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Git CLI wrapper
#[derive(Debug, Clone)]
pub struct GitFetcher<R> {
    runner: R,
    git_path: String,
}

impl<R: CommandRunner> GitFetcher<R> {
    pub fn new(runner: R) -> Self {
        Self::with_git_path(runner, "git")
    }

    pub fn with_git_path(runner: R, git_path: impl Into<String>) -> Self {
        Self {
            runner,
            git_path: git_path.into(),
        }
    }

    /// Clone `reference` at its branch into `target_dir`
    #[instrument(skip(self), fields(reference = %reference))]
    pub fn fetch(&self, reference: &RepositoryReference, target_dir: &Path) -> Result<(), GitError> {
        info!(
            "Cloning {} (branch {}) into {}",
            reference.clone_url(),
            reference.branch,
            target_dir.display()
        );
        let argv = vec![
            self.git_path.clone(),
            "clone".to_string(),
            "--branch".to_string(),
            reference.branch.clone(),
            reference.clone_url(),
            target_dir.to_string_lossy().into_owned(),
        ];
        self.runner
            .run(&argv, &RunOptions::default())
            .map_err(|e| fetch_error("clone", e))?;
        Ok(())
    }

    /// Pull the latest changes into an existing checkout
    #[instrument(skip(self))]
    pub fn refresh(&self, existing_dir: &Path) -> Result<(), GitError> {
        info!("Pulling latest changes in {}", existing_dir.display());
        let argv = vec![self.git_path.clone(), "pull".to_string()];
        self.runner
            .run(&argv, &RunOptions::default().in_dir(existing_dir))
            .map_err(|e| fetch_error("pull", e))?;
        Ok(())
    }

    /// URL of the `origin` remote, or `None` when it cannot be determined
    pub fn remote_url(&self, checkout: &Path) -> Option<String> {
        let argv = vec![
            self.git_path.clone(),
            "-C".to_string(),
            checkout.to_string_lossy().into_owned(),
            "remote".to_string(),
            "get-url".to_string(),
            "origin".to_string(),
        ];
        match self.runner.run(&argv, &RunOptions::unchecked()) {
            Ok(output) if output.success() => {
                let url = output.stdout.trim();
                (!url.is_empty()).then(|| url.to_string())
            }
            Ok(output) => {
                debug!(
                    exit_code = output.exit_code,
                    "No origin remote for {}",
                    checkout.display()
                );
                None
            }
            Err(e) => {
                warn!("Remote URL lookup failed for {}: {}", checkout.display(), e);
                None
            }
        }
    }
}

fn fetch_error(operation: &'static str, error: ProcessError) -> GitError {
    match error {
        ProcessError::NonZeroExit {
            exit_code, stderr, ..
        } => GitError::Fetch {
            operation,
            exit_code,
            stderr,
        },
        other => GitError::CLIError(other.to_string()),
    }
}
