//! Installer configuration
//!
//! Resolution precedence for every setting is:
//! CLI flag > environment variable > `<home>/config.toml` > built-in default.
//!
//! The resolved [`SinstallerConfig`] is passed explicitly into the
//! orchestrator; nothing in the core reads these locations from ambient state.
//!
//! ```toml
//! # ~/.mcp-sinstaller/config.toml
//! servers_dir = "/srv/mcp/servers"
//! runtime = "podman"
//! planner_command = ["llm-plan", "--json"]
//! # or: planner_url = "http://127.0.0.1:8080/v1/plan"
//! ```

use crate::errors::ConfigError;
use crate::runtime::RuntimeKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the installer home directory
pub const HOME_ENV: &str = "SINSTALLER_HOME";

/// Environment variable holding the planner command line
pub const PLANNER_ENV: &str = "SINSTALLER_PLANNER";

/// Environment variable holding the planner endpoint URL
pub const PLANNER_URL_ENV: &str = "SINSTALLER_PLANNER_URL";

/// Name of the home directory under the user's home
pub const DEFAULT_HOME_DIR_NAME: &str = ".mcp-sinstaller";

/// Name of the optional configuration file inside the home directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// On-disk configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub servers_dir: Option<PathBuf>,
    pub runtime: Option<RuntimeKind>,
    pub runtime_path: Option<String>,
    pub git_path: Option<String>,
    pub planner_command: Option<Vec<String>>,
    pub planner_url: Option<String>,
}

impl ConfigFile {
    /// Load `path`, returning the empty configuration when it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No configuration file at {}", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::Parsing {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub home: Option<PathBuf>,
    pub servers_dir: Option<PathBuf>,
    pub runtime: Option<RuntimeKind>,
    pub runtime_path: Option<String>,
    pub git_path: Option<String>,
    pub planner_command: Option<String>,
    pub planner_url: Option<String>,
}

/// Fully resolved installer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinstallerConfig {
    /// Installer home (holds `config.toml` and, by default, `servers/`)
    pub home: PathBuf,
    /// Base directory with one subdirectory per installation
    pub servers_dir: PathBuf,
    /// Container runtime flavor
    pub runtime: RuntimeKind,
    /// Container runtime binary
    pub runtime_path: String,
    /// Git binary
    pub git_path: String,
    /// External planner argv, if configured
    pub planner_command: Option<Vec<String>>,
    /// Planner HTTP endpoint, if configured
    pub planner_url: Option<String>,
}

impl SinstallerConfig {
    /// Configuration rooted at `home` with defaults for everything else
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            servers_dir: home.join("servers"),
            home,
            runtime: RuntimeKind::Docker,
            runtime_path: RuntimeKind::Docker.default_binary().to_string(),
            git_path: "git".to_string(),
            planner_command: None,
            planner_url: None,
        }
    }

    /// Resolve configuration from overrides, environment, and config file
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let home = match overrides.home {
            Some(home) => home,
            None => match std::env::var_os(HOME_ENV) {
                Some(home) => PathBuf::from(home),
                None => default_home()?,
            },
        };

        let file = ConfigFile::load(&home.join(CONFIG_FILE_NAME))?;
        let runtime = RuntimeKind::detect(overrides.runtime, file.runtime);

        let planner_command = match overrides.planner_command {
            Some(raw) => Some(parse_command_line(&raw)?),
            None => match std::env::var(PLANNER_ENV) {
                Ok(raw) if !raw.trim().is_empty() => Some(parse_command_line(&raw)?),
                _ => file.planner_command,
            },
        };
        if matches!(&planner_command, Some(cmd) if cmd.is_empty()) {
            return Err(ConfigError::Validation {
                message: "planner_command must not be empty".to_string(),
            });
        }

        let planner_url = overrides
            .planner_url
            .or_else(|| std::env::var(PLANNER_URL_ENV).ok().filter(|u| !u.trim().is_empty()))
            .or(file.planner_url);

        Ok(Self {
            servers_dir: overrides
                .servers_dir
                .or(file.servers_dir)
                .unwrap_or_else(|| home.join("servers")),
            runtime,
            runtime_path: overrides
                .runtime_path
                .or(file.runtime_path)
                .unwrap_or_else(|| runtime.default_binary().to_string()),
            git_path: overrides
                .git_path
                .or(file.git_path)
                .unwrap_or_else(|| "git".to_string()),
            planner_command,
            planner_url,
            home,
        })
    }
}

/// `~/.mcp-sinstaller`
fn default_home() -> Result<PathBuf, ConfigError> {
    directories_next::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(DEFAULT_HOME_DIR_NAME))
        .ok_or(ConfigError::NoHome)
}

/// Split a shell-style command line into argv
fn parse_command_line(raw: &str) -> Result<Vec<String>, ConfigError> {
    shell_words::split(raw).map_err(|e| ConfigError::Validation {
        message: format!("Invalid planner command '{}': {}", raw, e),
    })
}
