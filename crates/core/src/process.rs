//! External command execution
//!
//! Every source-control and container-runtime interaction goes through the
//! [`CommandRunner`] trait. Calls are blocking and never retried. Whether a
//! non-zero exit is a fault is an explicit per-call policy
//! ([`RunOptions::check_exit_code`]) so call sites state which commands are
//! allowed to fail silently.

use crate::errors::ProcessError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, instrument};

/// Options for a single command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Working directory for the command
    pub cwd: Option<PathBuf>,
    /// Convert a non-zero exit into [`ProcessError::NonZeroExit`]
    pub check_exit_code: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            check_exit_code: true,
        }
    }
}

impl RunOptions {
    /// Options that return non-zero exits to the caller instead of failing
    pub fn unchecked() -> Self {
        Self {
            cwd: None,
            check_exit_code: false,
        }
    }

    /// Run the command from `dir`
    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal)
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status zero
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Command execution collaborator
pub trait CommandRunner: Send + Sync {
    /// Run `argv[0]` with the remaining elements as arguments
    fn run(&self, argv: &[String], options: &RunOptions) -> Result<CommandOutput, ProcessError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, argv: &[String], options: &RunOptions) -> Result<CommandOutput, ProcessError> {
        (**self).run(argv, options)
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<T> {
    fn run(&self, argv: &[String], options: &RunOptions) -> Result<CommandOutput, ProcessError> {
        (**self).run(argv, options)
    }
}

/// Build an owned argv from string slices
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

/// Apply the exit-code policy to a finished command
pub(crate) fn check_output(
    argv: &[String],
    output: CommandOutput,
    options: &RunOptions,
) -> Result<CommandOutput, ProcessError> {
    if options.check_exit_code && !output.success() {
        return Err(ProcessError::NonZeroExit {
            command: argv.join(" "),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

/// Runs commands on the host with `std::process::Command`
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemCommandRunner {
    #[instrument(skip(self, options), fields(cwd = ?options.cwd))]
    fn run(&self, argv: &[String], options: &RunOptions) -> Result<CommandOutput, ProcessError> {
        let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;
        debug!("Running command: {}", argv.join(" "));

        let mut command = Command::new(program);
        command.args(args);
        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }

        let output = command.output().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(exit_code = result.exit_code, "Command finished: {}", program);

        check_output(argv, result, options)
    }
}

pub mod mock {
    //! Mock command runner for testing lifecycle flows
    //!
    //! Responses are matched by argv prefix (first registered match wins);
    //! unmatched commands succeed with empty output. Every invocation is
    //! recorded so tests can assert which commands ran and with what policy.

    use super::{check_output, CommandOutput, CommandRunner, RunOptions};
    use crate::errors::ProcessError;
    use std::sync::{Arc, Mutex};

    type Hook = Arc<dyn Fn(&[String]) + Send + Sync>;

    /// One recorded invocation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MockCall {
        pub argv: Vec<String>,
        pub options: RunOptions,
    }

    impl MockCall {
        /// The argv joined with spaces
        pub fn command_line(&self) -> String {
            self.argv.join(" ")
        }
    }

    #[derive(Clone)]
    struct MockRule {
        prefix: Vec<String>,
        output: Option<CommandOutput>,
        hook: Option<Hook>,
    }

    /// Scripted [`CommandRunner`]
    #[derive(Clone, Default)]
    pub struct MockCommandRunner {
        rules: Arc<Mutex<Vec<MockRule>>>,
        history: Arc<Mutex<Vec<MockCall>>>,
    }

    impl std::fmt::Debug for MockCommandRunner {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockCommandRunner")
                .field("calls", &self.calls().len())
                .finish()
        }
    }

    impl MockCommandRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Return `output` for commands starting with `prefix`
        pub fn respond(&self, prefix: &[&str], output: CommandOutput) -> &Self {
            self.push_rule(prefix, Some(output), None);
            self
        }

        /// Run `hook` with the argv for commands starting with `prefix`
        ///
        /// Used to simulate side effects such as `git clone` creating its target.
        pub fn on_command<F>(&self, prefix: &[&str], hook: F) -> &Self
        where
            F: Fn(&[String]) + Send + Sync + 'static,
        {
            self.push_rule(prefix, None, Some(Arc::new(hook)));
            self
        }

        fn push_rule(&self, prefix: &[&str], output: Option<CommandOutput>, hook: Option<Hook>) {
            let rule = MockRule {
                prefix: prefix.iter().map(|s| s.to_string()).collect(),
                output,
                hook,
            };
            if let Ok(mut rules) = self.rules.lock() {
                rules.push(rule);
            }
        }

        /// All recorded invocations in order
        pub fn calls(&self) -> Vec<MockCall> {
            self.history.lock().map(|h| h.clone()).unwrap_or_default()
        }

        /// Recorded command lines in order
        pub fn command_lines(&self) -> Vec<String> {
            self.calls().iter().map(MockCall::command_line).collect()
        }

        /// Whether any recorded command starts with `prefix`
        pub fn ran(&self, prefix: &[&str]) -> bool {
            self.calls().iter().any(|call| starts_with(&call.argv, prefix))
        }
    }

    fn starts_with(argv: &[String], prefix: &[impl AsRef<str>]) -> bool {
        argv.len() >= prefix.len()
            && argv
                .iter()
                .zip(prefix.iter())
                .all(|(a, p)| a.as_str() == p.as_ref())
    }

    impl CommandRunner for MockCommandRunner {
        fn run(
            &self,
            argv: &[String],
            options: &RunOptions,
        ) -> Result<CommandOutput, ProcessError> {
            if argv.is_empty() {
                return Err(ProcessError::EmptyCommand);
            }
            if let Ok(mut history) = self.history.lock() {
                history.push(MockCall {
                    argv: argv.to_vec(),
                    options: options.clone(),
                });
            }

            let matching: Vec<MockRule> = self
                .rules
                .lock()
                .map(|rules| {
                    rules
                        .iter()
                        .filter(|rule| starts_with(argv, &rule.prefix))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            for hook in matching.iter().filter_map(|rule| rule.hook.as_ref()) {
                hook(argv);
            }

            let output = matching
                .iter()
                .find_map(|rule| rule.output.clone())
                .unwrap_or_default();

            check_output(argv, output, options)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockCommandRunner;
    use super::*;

    #[test]
    fn test_run_options_default_checks_exit_code() {
        let options = RunOptions::default();
        assert!(options.check_exit_code);
        assert!(options.cwd.is_none());

        let options = RunOptions::unchecked().in_dir("/tmp");
        assert!(!options.check_exit_code);
        assert_eq!(options.cwd, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_system_runner_empty_command() {
        let runner = SystemCommandRunner::new();
        let result = runner.run(&[], &RunOptions::default());
        assert!(matches!(result, Err(ProcessError::EmptyCommand)));
    }

    #[test]
    fn test_system_runner_missing_program_is_spawn_error() {
        let runner = SystemCommandRunner::new();
        let result = runner.run(
            &argv(["sinstaller-definitely-not-a-real-binary"]),
            &RunOptions::unchecked(),
        );
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }

    #[test]
    fn test_mock_runner_checked_failure() {
        let runner = MockCommandRunner::new();
        runner.respond(&["git", "pull"], CommandOutput::new(1, "", "conflict"));

        let err = runner
            .run(&argv(["git", "pull"]), &RunOptions::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(err.stderr(), "conflict");

        let output = runner
            .run(&argv(["git", "pull"]), &RunOptions::unchecked())
            .unwrap();
        assert_eq!(output.exit_code, 1);
        assert_eq!(runner.calls().len(), 2);
        assert!(!runner.calls()[1].options.check_exit_code);
    }

    #[test]
    fn test_mock_runner_first_match_wins_and_hooks_run() {
        let runner = MockCommandRunner::new();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_hook = seen.clone();
        runner
            .on_command(&["docker"], move |argv| {
                seen_hook.lock().unwrap().push(argv.join(" "));
            })
            .respond(&["docker", "images"], CommandOutput::new(0, "abc\n", ""))
            .respond(&["docker"], CommandOutput::new(0, "other", ""));

        let output = runner
            .run(&argv(["docker", "images", "-q", "img"]), &RunOptions::unchecked())
            .unwrap();
        assert_eq!(output.stdout, "abc\n");
        assert_eq!(seen.lock().unwrap().as_slice(), ["docker images -q img"]);
        assert!(runner.ran(&["docker", "images"]));
        assert!(!runner.ran(&["git"]));
    }
}
