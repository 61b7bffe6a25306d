//! External planner program backend
//!
//! Runs an operator-configured program once per prompt. The user prompt is
//! written to the program's stdin; the system prompt and token budget are
//! passed as environment variables. Whatever the program prints on stdout is
//! the reply.

use super::{Completion, Prompt};
use crate::errors::PlannerError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Environment variable carrying the system prompt
pub const SYSTEM_PROMPT_ENV: &str = "SINSTALLER_SYSTEM_PROMPT";
/// Environment variable carrying the reply token budget
pub const MAX_TOKENS_ENV: &str = "SINSTALLER_MAX_TOKENS";

#[derive(Debug, Clone)]
pub struct CommandCompletion {
    argv: Vec<String>,
}

impl CommandCompletion {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl Completion for CommandCompletion {
    #[instrument(skip_all, fields(program = ?self.argv.first()))]
    async fn complete(&self, prompt: &Prompt) -> Result<String, PlannerError> {
        let (program, args) = self.argv.split_first().ok_or_else(|| PlannerError::Request {
            message: "planner command is empty".to_string(),
        })?;

        let mut child = Command::new(program)
            .args(args)
            .env(SYSTEM_PROMPT_ENV, &prompt.system)
            .env(MAX_TOKENS_ENV, prompt.max_tokens.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PlannerError::Request {
                message: format!("Failed to start planner '{}': {}", program, e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(prompt.user.as_bytes()).await {
                Ok(()) => {}
                // the exit status below explains an early exit
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("Planner closed stdin before reading the prompt")
                }
                Err(e) => {
                    return Err(PlannerError::Request {
                        message: format!("Failed to send prompt to planner '{}': {}", program, e),
                    })
                }
            }
        }

        let output = child.wait_with_output().await.map_err(|e| PlannerError::Request {
            message: format!("Planner '{}' did not finish: {}", program, e),
        })?;

        if !output.status.success() {
            return Err(PlannerError::Request {
                message: format!(
                    "Planner '{}' exited with code {}: {}",
                    program,
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let reply = String::from_utf8_lossy(&output.stdout).into_owned();
        if reply.trim().is_empty() {
            return Err(PlannerError::Request {
                message: format!("Planner '{}' returned an empty reply", program),
            });
        }
        debug!(bytes = reply.len(), "Planner replied");
        Ok(reply)
    }
}
