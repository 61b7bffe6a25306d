//! Error types and handling
//!
//! The error taxonomy mirrors the component split of the installer: each
//! component owns a domain-specific error enum (reference parsing, source
//! fetching, plan validation, container runtime, metadata store, planner,
//! lifecycle), and all of them are wrapped in [`SinstallerError`] for unified
//! handling at the orchestrator and CLI boundaries.
//!
//! A failed image build is *not* represented here: it is a reported outcome
//! (see [`crate::build::BuildOutcome`]) rather than an error value.

use std::path::PathBuf;
use thiserror::Error;

/// Repository reference parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// Input did not match any recognized reference shape
    #[error("Invalid GitHub URL format: {reference}")]
    Malformed { reference: String },

    /// A component would not be a safe single path segment
    #[error("Invalid repository reference '{reference}': unsafe path component '{component}'")]
    UnsafeComponent {
        reference: String,
        component: String,
    },
}

/// External command execution errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Empty argv
    #[error("Cannot run an empty command")]
    EmptyCommand,

    /// The program could not be started at all
    #[error("Failed to execute '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited non-zero while the caller required success
    #[error("Command '{command}' failed with exit code {exit_code}: {stderr}")]
    NonZeroExit {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
}

impl ProcessError {
    /// Exit code reported by the tool, if it ran
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Captured stderr, empty when the tool never ran
    pub fn stderr(&self) -> &str {
        match self {
            Self::NonZeroExit { stderr, .. } => stderr,
            _ => "",
        }
    }
}

/// Git-related errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Clone or pull exited non-zero
    #[error("Failed to {operation} repository (exit code {exit_code}): {stderr}")]
    Fetch {
        operation: &'static str,
        exit_code: i32,
        stderr: String,
    },

    /// Git could not be executed
    #[error("Git CLI error: {0}")]
    CLIError(String),
}

/// Execution plan validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Payload is not a parseable JSON object
    #[error("Invalid JSON in Docker plan: {message}\nRaw response: {excerpt}")]
    InvalidPlanFormat {
        message: String,
        /// Raw payload truncated to at most 500 characters (plus an ellipsis marker)
        excerpt: String,
    },

    /// A required field is absent
    #[error("Missing required field in Docker plan: {0}")]
    MissingPlanField(String),

    /// `ports` is present but not a mapping
    #[error("Ports must be a dictionary mapping container_port:host_port")]
    InvalidPortsShape,
}

/// Docker/Runtime-related errors
#[derive(Error, Debug)]
pub enum DockerError {
    /// Runtime CLI command error
    #[error("{runtime} CLI error: {message}")]
    CLIError { runtime: String, message: String },

    /// Writing the generated build file failed
    #[error("Failed to write Dockerfile at {path}: {source}")]
    DockerfileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Metadata store errors
#[derive(Error, Debug)]
pub enum MetadataError {
    /// No metadata file in the installation directory
    #[error("Metadata file not found: {path}")]
    NotFound { path: PathBuf },

    /// Metadata file exists but cannot be parsed
    #[error("Failed to read metadata ({message})")]
    Corrupt { path: PathBuf, message: String },

    /// Metadata could not be read or written
    #[error("Metadata I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Metadata could not be serialized
    #[error("Failed to serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Planning collaborator errors
#[derive(Error, Debug)]
pub enum PlannerError {
    /// The collaborator returned a failure or could not be reached
    #[error("Planner request failed: {message}")]
    Request { message: String },

    /// Collaborator input could not be read
    #[error("Failed to read planner input {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file {path}: {message}")]
    Parsing { path: PathBuf, message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// Home directory could not be determined
    #[error("Cannot determine home directory; set SINSTALLER_HOME or pass --home")]
    NoHome,

    /// Value is not acceptable
    #[error("Configuration validation error: {message}")]
    Validation { message: String },
}

/// Lifecycle orchestration errors
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Installation directory exists and force was not requested
    #[error("Server '{name}' already exists{}. Use force=true to reinstall.",
        existing_source.as_deref().map(|s| format!(" (installed from {})", s)).unwrap_or_default())]
    AlreadyExists {
        name: String,
        existing_source: Option<String>,
    },

    /// No planning collaborator was supplied
    #[error("No request context available for analysis")]
    NoContext,

    /// Installation directory does not exist
    #[error("Server '{name}' not found.")]
    NotFound { name: String },

    /// Installation directory exists without a metadata file
    #[error("Server '{name}' found but missing metadata. Please reinstall.")]
    MissingMetadata { name: String },

    /// Installation metadata exists but cannot be parsed
    #[error("Server '{name}' has corrupt metadata ({message}). Please reinstall.")]
    CorruptMetadata { name: String, message: String },

    /// The build context escapes the checkout through a symlink
    #[error("Build context {path} resolves outside the cloned repository")]
    SourceOutsideCheckout { path: PathBuf },

    /// A blocking lifecycle step panicked or was cancelled
    #[error("Background task failed: {message}")]
    Task { message: String },

    /// Filesystem operation on the installation tree failed
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum SinstallerError {
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Docker error: {0}")]
    Docker(#[from] DockerError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Analysis failed: {0}")]
    Planner(#[from] PlannerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl SinstallerError {
    /// Excerpt of the planner output behind a rejected plan
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::Plan(PlanError::InvalidPlanFormat { excerpt, .. }) => Some(excerpt.as_str()),
            _ => None,
        }
    }
}

/// Convenience type alias for Results with SinstallerError
pub type Result<T> = std::result::Result<T, SinstallerError>;
