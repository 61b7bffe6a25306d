use crate::commands;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use sinstaller_core::config::{ConfigOverrides, SinstallerConfig};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Runtime selection options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum RuntimeOption {
    /// Docker runtime
    Docker,
    /// Podman runtime
    Podman,
}

impl From<RuntimeOption> for sinstaller_core::runtime::RuntimeKind {
    fn from(runtime: RuntimeOption) -> Self {
        match runtime {
            RuntimeOption::Docker => sinstaller_core::runtime::RuntimeKind::Docker,
            RuntimeOption::Podman => sinstaller_core::runtime::RuntimeKind::Podman,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

/// Resolved global options shared by all subcommands
#[derive(Debug, Clone)]
pub struct CliContext {
    /// Result format on stdout
    pub output: OutputFormat,
    /// Resolved installer configuration
    pub config: SinstallerConfig,
    /// Whether progress spinners may be drawn on stderr
    pub spinner: bool,
}

/// Installer subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Clone, analyze, and build an MCP server from a GitHub URL
    #[command(long_about = "Clone, analyze, and build an MCP server from a GitHub URL\n\n\
        Accepts https://github.com/<owner>/<repo> or\n\
        https://github.com/<owner>/<repo>/tree/<branch>/<path> for a server in a subdirectory.\n\n\
        A planner is required: --plan-file, --planner-command, or --planner-url\n\
        (or the SINSTALLER_PLANNER / SINSTALLER_PLANNER_URL environment variables).")]
    Install {
        /// GitHub repository URL
        url: String,
        /// Remove an existing installation of the same name first
        #[arg(long)]
        force: bool,
        /// Planner command line; the prompt is written to its stdin
        #[arg(long, value_name = "CMD")]
        planner_command: Option<String>,
        /// Planner HTTP endpoint
        #[arg(long, value_name = "URL")]
        planner_url: Option<String>,
        /// Pre-authored execution plan (JSON)
        #[arg(long, value_name = "PATH")]
        plan_file: Option<PathBuf>,
        /// Analysis text reported alongside --plan-file
        #[arg(long, value_name = "PATH", requires = "plan_file")]
        analysis_file: Option<PathBuf>,
    },

    /// Pull the latest source of an installed server and rebuild its image
    Update {
        /// Installation name (as shown by `list`)
        name: String,
    },

    /// Remove an installed server's container, image, and files
    Delete {
        /// Installation name (as shown by `list`)
        name: String,
    },

    /// List installed servers
    List,
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "MCP server installer",
    long_about = "MCP server installer\n\nInstalls MCP servers from GitHub repositories as container images and tracks their lifecycle.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via SINSTALLER_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Result output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Installer home directory (defaults to ~/.mcp-sinstaller, can be set via SINSTALLER_HOME env var)
    #[arg(long, global = true, value_name = "PATH")]
    pub home: Option<PathBuf>,

    /// Directory holding installations (defaults to <home>/servers)
    #[arg(long, global = true, value_name = "PATH")]
    pub servers_dir: Option<PathBuf>,

    /// Container runtime to use (docker or podman, can be set via SINSTALLER_RUNTIME env var)
    #[arg(long, global = true, value_enum)]
    pub runtime: Option<RuntimeOption>,

    /// Path to the container runtime executable
    #[arg(long, global = true, value_name = "PATH")]
    pub runtime_path: Option<String>,

    /// Path to the git executable
    #[arg(long, global = true, value_name = "PATH")]
    pub git_path: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Configuration overrides taken from the command line
    pub fn overrides(&self) -> ConfigOverrides {
        let (planner_command, planner_url) = match &self.command {
            Some(Commands::Install {
                planner_command,
                planner_url,
                ..
            }) => (planner_command.clone(), planner_url.clone()),
            _ => (None, None),
        };
        ConfigOverrides {
            home: self.home.clone(),
            servers_dir: self.servers_dir.clone(),
            runtime: self.runtime.map(Into::into),
            runtime_path: self.runtime_path.clone(),
            git_path: self.git_path.clone(),
            planner_command,
            planner_url,
        }
    }

    /// Run the selected subcommand
    ///
    /// Returns whether the operation succeeded. Operation failures are
    /// rendered in the selected output format before returning `false`;
    /// only setup errors (such as an unreadable config file) are returned
    /// as `Err`.
    pub async fn dispatch(self) -> Result<bool> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None,
        };

        let spinner = self.output == OutputFormat::Text
            && std::io::stderr().is_terminal()
            && !matches!(log_format, Some("json"));

        // Spinner sessions stay quiet unless a level was asked for explicitly
        let log_level = match self.log_level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info if spinner => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        sinstaller_core::logging::init_with_level(log_format, Some(log_level))?;
        tracing::debug!("CLI initialized with log level: {}", log_level);

        let Some(command) = self.command.as_ref() else {
            println!("MCP server installer");
            println!("Run 'sinstaller --help' to see available commands.");
            return Ok(true);
        };

        let config = SinstallerConfig::resolve(self.overrides())?;
        tracing::debug!(
            servers_dir = %config.servers_dir.display(),
            runtime = %config.runtime,
            "Configuration resolved"
        );
        let context = CliContext {
            output: self.output,
            config,
            spinner,
        };

        let result = match command {
            Commands::Install {
                url,
                force,
                plan_file,
                analysis_file,
                ..
            } => {
                commands::install::execute_install(
                    commands::install::InstallArgs {
                        url: url.clone(),
                        force: *force,
                        plan_file: plan_file.clone(),
                        analysis_file: analysis_file.clone(),
                    },
                    &context,
                )
                .await
            }
            Commands::Update { name } => commands::update::execute_update(name, &context).await,
            Commands::Delete { name } => commands::delete::execute_delete(name, &context).await,
            Commands::List => commands::list::execute_list(&context).await,
        };

        match result {
            Ok(success) => Ok(success),
            Err(err) => {
                commands::report_failure(&context, &err)?;
                Ok(false)
            }
        }
    }
}
