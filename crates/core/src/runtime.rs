//! Container runtime selection
//!
//! Docker and Podman share a compatible CLI for everything the installer
//! issues (`build`, `images`, `rmi`, `ps`, `stop`, `rm`), so the runtime is
//! just a binary choice threaded into [`crate::docker::CliRuntime`].

use crate::errors::ConfigError;

/// Environment variable selecting the container runtime
pub const RUNTIME_ENV: &str = "SINSTALLER_RUNTIME";

/// Runtime selection options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeKind {
    /// Docker runtime
    #[default]
    Docker,
    /// Podman runtime
    Podman,
}

impl RuntimeKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }

    /// Default binary name for this runtime
    pub fn default_binary(&self) -> &'static str {
        self.as_str()
    }

    /// Detect runtime from CLI flag, environment variable, or default
    ///
    /// Precedence: CLI flag > SINSTALLER_RUNTIME env var > config file > docker
    pub fn detect(cli_runtime: Option<RuntimeKind>, configured: Option<RuntimeKind>) -> Self {
        if let Some(runtime) = cli_runtime {
            return runtime;
        }

        if let Ok(env_runtime) = std::env::var(RUNTIME_ENV) {
            match env_runtime.parse() {
                Ok(runtime) => return runtime,
                Err(e) => tracing::warn!("Ignoring {}: {}", RUNTIME_ENV, e),
            }
        }

        configured.unwrap_or_default()
    }
}

impl std::str::FromStr for RuntimeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(ConfigError::Validation {
                message: format!("Unknown runtime: {}. Supported runtimes: docker, podman", s),
            }),
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for RuntimeKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
