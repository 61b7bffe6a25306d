//! Run command synthesis
//!
//! Pure functions turning a plan (or recorded metadata) into the container
//! run command an operator copies into a shell, plus the matching
//! instructions text. Output depends only on the inputs and is stable
//! across calls.
//!
//! Secrets are emitted as `-e NAME=${NAME}` shell references; their values
//! never appear in the command.

use crate::plan::{ExecutionPlan, TransportType};
use crate::runtime::RuntimeKind;
use indexmap::IndexMap;

/// The inputs run command synthesis reads
#[derive(Debug, Clone, Copy)]
pub struct RunSettings<'a> {
    pub container_name: &'a str,
    pub image_name: &'a str,
    pub ports: &'a IndexMap<String, String>,
    pub environment_variables: &'a IndexMap<String, String>,
    pub required_secrets: &'a [String],
    pub volumes: &'a IndexMap<String, String>,
    pub startup_command: Option<&'a str>,
    pub transport_type: TransportType,
}

impl<'a> From<&'a ExecutionPlan> for RunSettings<'a> {
    fn from(plan: &'a ExecutionPlan) -> Self {
        Self {
            container_name: &plan.container_name,
            image_name: &plan.image_name,
            ports: &plan.ports,
            environment_variables: &plan.environment_variables,
            required_secrets: &plan.required_secrets,
            volumes: &plan.volumes,
            startup_command: plan.startup_command.as_deref(),
            transport_type: plan.transport_type,
        }
    }
}

/// Synthesized command and instructions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub argv: Vec<String>,
    /// `argv` joined with single spaces
    pub command: String,
    pub instructions: String,
}

/// Build the run command and instructions for `settings`
pub fn synthesize(settings: RunSettings<'_>, runtime: RuntimeKind) -> RunSpec {
    let argv = run_argv(&settings, runtime);
    let command = argv.join(" ");
    let instructions = instructions(&settings, &command);
    RunSpec {
        argv,
        command,
        instructions,
    }
}

fn run_argv(settings: &RunSettings<'_>, runtime: RuntimeKind) -> Vec<String> {
    let mut argv = vec![runtime.as_str().to_string(), "run".to_string()];

    match settings.transport_type {
        TransportType::Stdio => {
            argv.extend(["-i", "--rm", "--name"].map(String::from));
            argv.push(settings.container_name.to_string());
        }
        TransportType::Sse => {
            argv.extend(["-d", "--name"].map(String::from));
            argv.push(settings.container_name.to_string());
            for (container_port, host_port) in settings.ports {
                argv.push("-p".to_string());
                argv.push(format!("{}:{}", host_port, container_port));
            }
        }
    }

    for (key, value) in settings.environment_variables {
        argv.push("-e".to_string());
        argv.push(format!("{}={}", key, value));
    }
    for secret in settings.required_secrets {
        argv.push("-e".to_string());
        argv.push(format!("{}=${{{}}}", secret, secret));
    }
    for (host_path, container_path) in settings.volumes {
        argv.push("-v".to_string());
        argv.push(format!("{}:{}", host_path, container_path));
    }

    argv.push(settings.image_name.to_string());
    if let Some(startup) = settings.startup_command {
        argv.extend(startup.split_whitespace().map(String::from));
    }
    argv
}

/// `export NAME=your_actual_name_here` lines for each secret
pub fn secret_placeholders(secrets: &[String]) -> Vec<String> {
    secrets
        .iter()
        .map(|s| format!("export {}=your_actual_{}_here", s, s.to_lowercase()))
        .collect()
}

fn instructions(settings: &RunSettings<'_>, command: &str) -> String {
    let placeholders = secret_placeholders(settings.required_secrets);
    let secrets = if placeholders.is_empty() {
        "   No secrets required".to_string()
    } else {
        placeholders.join("\n")
    };

    match settings.transport_type {
        TransportType::Stdio => format!(
            "\nTO RUN THE CONTAINER (STDIO Transport):\n\n\
             1. Set required environment variables (if any):\n{secrets}\n\n\
             2. Run the container interactively:\n   {command}\n   \n   \
             Note: This server uses STDIO transport (stdin/stdout communication).\n   \
             - The container runs interactively (-i flag)\n   \
             - It will be automatically removed when it exits (--rm flag)\n   \
             - No port mapping needed as it uses standard input/output\n\n\
             3. Use your MCP client to connect via subprocess/stdio transport\n"
        ),
        TransportType::Sse => format!(
            "\nTO RUN THE CONTAINER (SSE/HTTP Transport):\n\n\
             1. Set required environment variables (if any):\n{secrets}\n\n\
             2. Run the container:\n   {command}\n\n\
             3. Use your MCP client to connect via SSE/HTTP transport\n"
        ),
    }
}
