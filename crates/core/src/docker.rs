//! Container runtime CLI integration
//!
//! [`CliRuntime`] issues the handful of Docker/Podman commands the installer
//! needs through a [`CommandRunner`]. Most calls run with the exit-code check
//! disabled and return the raw output so callers can branch: a failed build
//! is a reported outcome and cleanup steps report per-resource results.

use crate::errors::{DockerError, ProcessError};
use crate::process::{CommandOutput, CommandRunner, RunOptions};
use crate::runtime::RuntimeKind;
use serde::{Serialize, Serializer};
use std::path::Path;
use tracing::{debug, instrument, warn};

/// `images --format` template used for the image summary line
pub const IMAGE_INFO_FORMAT: &str = "table {{.Repository}}:{{.Tag}}\t{{.Size}}\t{{.CreatedAt}}";

/// Generic CLI-based container runtime
///
/// Docker and Podman share a compatible CLI for every command issued here.
#[derive(Debug, Clone)]
pub struct CliRuntime<R> {
    /// Container runtime CLI binary path (e.g., "docker" or "podman")
    runtime_path: String,
    runner: R,
}

impl<R: CommandRunner> CliRuntime<R> {
    /// Runtime using the default binary for `kind`
    pub fn for_kind(runner: R, kind: RuntimeKind) -> Self {
        Self::with_runtime_path(runner, kind.default_binary())
    }

    /// Runtime using a custom binary path
    pub fn with_runtime_path(runner: R, runtime_path: impl Into<String>) -> Self {
        Self {
            runtime_path: runtime_path.into(),
            runner,
        }
    }

    pub fn runtime_path(&self) -> &str {
        &self.runtime_path
    }

    fn run(&self, args: &[&str], options: RunOptions) -> Result<CommandOutput, DockerError> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.runtime_path.clone());
        argv.extend(args.iter().map(|a| a.to_string()));
        self.runner.run(&argv, &options).map_err(|e| self.cli_error(e))
    }

    fn cli_error(&self, error: ProcessError) -> DockerError {
        DockerError::CLIError {
            runtime: self.runtime_path.clone(),
            message: error.to_string(),
        }
    }

    /// Local image ID for `image`, if present
    pub fn image_id(&self, image: &str) -> Result<Option<String>, DockerError> {
        let output = self.run(&["images", "-q", image], RunOptions::unchecked())?;
        Ok(first_line(&output.stdout))
    }

    /// Remove an existing image with the same name before a rebuild
    ///
    /// Failures are logged and swallowed.
    #[instrument(skip(self))]
    pub fn remove_stale_image(&self, image: &str) {
        match self.image_id(image) {
            Ok(Some(id)) => {
                debug!("Removing previous image {} ({})", image, id);
                match self.run(&["rmi", "-f", &id], RunOptions::unchecked()) {
                    Ok(output) if !output.success() => {
                        warn!("Could not remove previous image {}: {}", image, output.stderr.trim())
                    }
                    Err(e) => warn!("Could not remove previous image {}: {}", image, e),
                    Ok(_) => {}
                }
            }
            Ok(None) => debug!("No previous image named {}", image),
            Err(e) => warn!("Image lookup for {} failed: {}", image, e),
        }
    }

    /// Build `context` into an image tagged `tag`
    ///
    /// A non-zero exit is returned as output, not as an error.
    #[instrument(skip(self))]
    pub fn build(&self, tag: &str, context: &Path) -> Result<CommandOutput, DockerError> {
        let context = context.to_string_lossy();
        self.run(&["build", "-t", tag, &context], RunOptions::unchecked())
    }

    /// `repository:tag  size  created` summary for `image`; empty when unavailable
    pub fn image_info(&self, image: &str) -> String {
        match self.run(&["images", "--format", IMAGE_INFO_FORMAT, image], RunOptions::default()) {
            Ok(output) => output.stdout.trim().to_string(),
            Err(e) => {
                warn!("Could not read image info for {}: {}", image, e);
                String::new()
            }
        }
    }

    /// ID of a container (running or not) matching `name`
    pub fn find_container(&self, name: &str) -> Result<Option<String>, DockerError> {
        let filter = format!("name={}", name);
        let output = self.run(
            &["ps", "-a", "--filter", &filter, "--format", "{{.ID}}"],
            RunOptions::unchecked(),
        )?;
        Ok(first_line(&output.stdout))
    }

    /// Stop and remove the container `name` if it exists
    #[instrument(skip(self))]
    pub fn remove_container_if_present(&self, name: &str) -> CleanupOutcome {
        let kind = ResourceKind::Container;
        match self.find_container(name) {
            Ok(Some(_)) => {
                if let Err(e) = self.run(&["stop", name], RunOptions::unchecked()) {
                    warn!("Stopping container {} failed: {}", name, e);
                }
                match self.run(&["rm", name], RunOptions::unchecked()) {
                    Ok(output) if output.success() => CleanupOutcome::removed(kind, name),
                    Ok(output) => CleanupOutcome::Failed {
                        kind,
                        message: output.stderr,
                    },
                    Err(e) => CleanupOutcome::Error {
                        kind,
                        message: e.to_string(),
                    },
                }
            }
            Ok(None) => CleanupOutcome::Absent {
                kind,
                name: name.to_string(),
            },
            Err(e) => CleanupOutcome::Error {
                kind,
                message: e.to_string(),
            },
        }
    }

    /// Force-remove the image `name` if it exists
    #[instrument(skip(self))]
    pub fn remove_image_if_present(&self, name: &str) -> CleanupOutcome {
        let kind = ResourceKind::Image;
        match self.image_id(name) {
            Ok(Some(_)) => match self.run(&["rmi", "-f", name], RunOptions::unchecked()) {
                Ok(output) if output.success() => CleanupOutcome::removed(kind, name),
                Ok(output) => CleanupOutcome::Failed {
                    kind,
                    message: output.stderr,
                },
                Err(e) => CleanupOutcome::Error {
                    kind,
                    message: e.to_string(),
                },
            },
            Ok(None) => CleanupOutcome::Absent {
                kind,
                name: name.to_string(),
            },
            Err(e) => CleanupOutcome::Error {
                kind,
                message: e.to_string(),
            },
        }
    }
}

fn first_line(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Resource touched by a cleanup step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Container,
    Image,
    Repository,
}

impl ResourceKind {
    /// Lower-case noun used in outcome messages
    pub fn label(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Image => "image",
            Self::Repository => "repository",
        }
    }

    /// [`label`](Self::label) at the start of a sentence
    pub fn title(self) -> &'static str {
        match self {
            Self::Container => "Container",
            Self::Image => "Image",
            Self::Repository => "Repository",
        }
    }
}

/// Result of one cleanup step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The resource existed and was removed
    Removed { kind: ResourceKind, name: String },
    /// Nothing to remove
    Absent { kind: ResourceKind, name: String },
    /// The removal command ran and failed
    Failed { kind: ResourceKind, message: String },
    /// The step could not be carried out
    Error { kind: ResourceKind, message: String },
}

impl CleanupOutcome {
    pub fn removed(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::Removed {
            kind,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Removed { kind, .. }
            | Self::Absent { kind, .. }
            | Self::Failed { kind, .. }
            | Self::Error { kind, .. } => *kind,
        }
    }

    /// Whether the step left nothing behind
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Removed { .. } | Self::Absent { .. })
    }
}

impl std::fmt::Display for CleanupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Removed { kind, name } => write!(f, "✓ Removed {}: {}", kind.label(), name),
            Self::Absent { kind, name } => write!(f, "ℹ No {} found: {}", kind.label(), name),
            Self::Failed { kind, message } => {
                write!(f, "⚠ {} removal failed: {}", kind.title(), message.trim())
            }
            Self::Error { kind, message } => {
                let subject = match kind {
                    ResourceKind::Repository => "File",
                    other => other.title(),
                };
                write!(f, "⚠ {} cleanup error: {}", subject, message)
            }
        }
    }
}

impl Serialize for CleanupOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
