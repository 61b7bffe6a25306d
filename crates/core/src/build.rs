//! Image build execution
//!
//! Turns a validated [`ExecutionPlan`] into a built image and a ready-to-copy
//! run command, recording progress in the installation metadata:
//!
//! 1. write the plan's Dockerfile unless the project already has one
//! 2. persist metadata with status `image_built` before building
//! 3. remove any stale image with the same name (best effort)
//! 4. build; a non-zero exit records `build_failed` and is returned as
//!    [`BuildOutcome::Failed`], leaving the source tree in place
//! 5. on success synthesize the run command and instructions, record
//!    `ready_to_run`, and read back the image summary

use crate::docker::CliRuntime;
use crate::errors::{DockerError, Result};
use crate::metadata::{self, InstallationMetadata, InstallationStatus};
use crate::plan::{ExecutionPlan, TransportType};
use crate::process::CommandRunner;
use crate::run_command::{self, RunSettings};
use crate::runtime::RuntimeKind;
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Build file name written into the build context
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Whether `path` is a regular file, without following symlinks
///
/// Checkouts are untrusted; a symlink may point anywhere on the host.
pub fn is_regular_file(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_file())
}

/// Write the generated Dockerfile into `dir`, refusing to follow a symlink
fn write_dockerfile(dir: &Path, content: &str) -> std::result::Result<(), DockerError> {
    let path = dir.join(DOCKERFILE_NAME);
    if std::fs::symlink_metadata(&path).is_ok_and(|meta| meta.file_type().is_symlink()) {
        return Err(DockerError::DockerfileWrite {
            path,
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "refusing to write through a symbolic link",
            ),
        });
    }
    std::fs::write(&path, content).map_err(|source| DockerError::DockerfileWrite { path, source })
}

/// Where the Dockerfile used for the build came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerfileStatus {
    Existing,
    Generated,
}

impl DockerfileStatus {
    pub fn for_plan(plan: &ExecutionPlan) -> Self {
        if plan.has_existing_dockerfile {
            Self::Existing
        } else {
            Self::Generated
        }
    }
}

impl std::fmt::Display for DockerfileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Existing => f.write_str("Using existing Dockerfile"),
            Self::Generated => f.write_str("Generated new Dockerfile"),
        }
    }
}

impl Serialize for DockerfileStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Inputs for a fresh build
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub plan: &'a ExecutionPlan,
    /// Build context (the checkout, or the subpath inside it)
    pub source_dir: &'a Path,
    /// Installation directory holding the metadata file
    pub installation_dir: &'a Path,
    pub installation_name: &'a str,
    pub source_url: Option<&'a str>,
}

/// Successful build summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildReport {
    pub image_name: String,
    pub image_info: String,
    pub build_output: String,
    pub run_command: String,
    pub run_instructions: String,
    pub transport_type: TransportType,
    /// Published ports; always empty for stdio servers
    pub ports: IndexMap<String, String>,
    /// Names of the non-secret environment variables
    pub environment_variables: Vec<String>,
    pub required_secrets: Vec<String>,
    pub metadata_path: PathBuf,
}

/// Reported, non-fatal build failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildFailure {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub metadata_path: PathBuf,
}

/// Result of invoking the image build
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildOutcome {
    Built(BuildReport),
    Failed(BuildFailure),
}

impl BuildOutcome {
    pub fn is_built(&self) -> bool {
        matches!(self, Self::Built(_))
    }
}

/// Runs image builds through a container runtime
#[derive(Debug)]
pub struct BuildExecutor<'a, R> {
    runtime: &'a CliRuntime<R>,
    kind: RuntimeKind,
}

impl<'a, R: CommandRunner> BuildExecutor<'a, R> {
    pub fn new(runtime: &'a CliRuntime<R>, kind: RuntimeKind) -> Self {
        Self { runtime, kind }
    }

    /// Build a freshly validated plan
    #[instrument(skip_all, fields(installation = %request.installation_name, image = %request.plan.image_name))]
    pub fn build(&self, request: BuildRequest<'_>) -> Result<BuildOutcome> {
        let plan = request.plan;

        if plan.has_existing_dockerfile {
            info!("Using existing Dockerfile in {}", request.source_dir.display());
        } else {
            write_dockerfile(request.source_dir, &plan.dockerfile_content)?;
            info!("Wrote generated Dockerfile to {}", request.source_dir.display());
        }

        let mut record = InstallationMetadata::from_plan(
            plan,
            request.installation_name,
            request.source_url,
            request.source_dir,
            Utc::now(),
        );
        metadata::save(request.installation_dir, &record)?;

        self.run_build(&mut record, request.installation_dir)
    }

    /// Rebuild an installation from its recorded metadata
    ///
    /// The recorded image name and build context are used, not the caller's
    /// working directory. `updated_at` is refreshed on both outcomes.
    #[instrument(skip_all, fields(installation = %record.installation_name, image = %record.image_name))]
    pub fn rebuild(
        &self,
        record: &mut InstallationMetadata,
        installation_dir: &Path,
    ) -> Result<BuildOutcome> {
        record.updated_at = Some(Utc::now());
        self.run_build(record, installation_dir)
    }

    fn run_build(
        &self,
        record: &mut InstallationMetadata,
        installation_dir: &Path,
    ) -> Result<BuildOutcome> {
        let metadata_path = metadata::metadata_path(installation_dir);

        self.runtime.remove_stale_image(&record.image_name);

        let output = match self.runtime.build(&record.image_name, &record.repository_path) {
            Ok(output) => output,
            Err(e) => {
                record.status = InstallationStatus::BuildFailed;
                if let Err(save_error) = metadata::save(installation_dir, record) {
                    warn!("Could not record build failure: {}", save_error);
                }
                return Err(e.into());
            }
        };

        if !output.success() {
            warn!(exit_code = output.exit_code, "Image build failed for {}", record.image_name);
            record.status = InstallationStatus::BuildFailed;
            metadata::save(installation_dir, record)?;
            return Ok(BuildOutcome::Failed(BuildFailure {
                stdout: output.stdout,
                stderr: output.stderr,
                exit_code: output.exit_code,
                metadata_path,
            }));
        }

        let spec = run_command::synthesize(RunSettings::from(&*record), self.kind);
        record.status = InstallationStatus::ReadyToRun;
        record.run_command = Some(spec.command.clone());
        record.run_instructions = Some(spec.instructions.clone());
        metadata::save(installation_dir, record)?;
        info!("Built image {}", record.image_name);

        let ports = if record.transport_type.is_stdio() {
            IndexMap::new()
        } else {
            record.ports.clone()
        };

        Ok(BuildOutcome::Built(BuildReport {
            image_name: record.image_name.clone(),
            image_info: self.runtime.image_info(&record.image_name),
            build_output: output.stdout,
            run_command: spec.command,
            run_instructions: spec.instructions,
            transport_type: record.transport_type,
            ports,
            environment_variables: record.environment_variables.keys().cloned().collect(),
            required_secrets: record.required_secrets.clone(),
            metadata_path,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan;
    use crate::process::mock::MockCommandRunner;
    use crate::process::CommandOutput;
    use tempfile::TempDir;

    fn plan_json(existing: bool, transport: &str) -> String {
        format!(
            r#"{{"dockerfile_content": "FROM python:3.12\nCMD python server.py",
                 "image_name": "mcp-o-r", "container_name": "mcp-o-r-container",
                 "ports": {{"8000": "8000"}}, "required_secrets": ["API_KEY"],
                 "has_existing_dockerfile": {existing}, "transport_type": "{transport}"}}"#
        )
    }

    #[test]
    fn test_successful_build_records_ready_to_run() {
        let temp = TempDir::new().unwrap();
        let runner = MockCommandRunner::new();
        runner.respond(
            &["docker", "images", "--format"],
            CommandOutput::new(0, "REPOSITORY:TAG\tSIZE\tCREATED\nmcp-o-r:latest\t120MB\tnow\n", ""),
        );
        let runtime = CliRuntime::for_kind(runner.clone(), RuntimeKind::Docker);
        let plan = plan::validate(&plan_json(false, "sse"), "o-r").unwrap();

        let outcome = BuildExecutor::new(&runtime, RuntimeKind::Docker)
            .build(BuildRequest {
                plan: &plan,
                source_dir: temp.path(),
                installation_dir: temp.path(),
                installation_name: "o-r",
                source_url: Some("https://github.com/o/r"),
            })
            .unwrap();

        let report = match outcome {
            BuildOutcome::Built(report) => report,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert!(report.image_info.contains("mcp-o-r:latest"));
        assert!(report.run_command.contains("-p 8000:8000"));
        assert_eq!(report.ports.len(), 1);

        let dockerfile = std::fs::read_to_string(temp.path().join(DOCKERFILE_NAME)).unwrap();
        assert!(dockerfile.starts_with("FROM python:3.12"));

        let record = metadata::load(temp.path()).unwrap();
        assert_eq!(record.status, InstallationStatus::ReadyToRun);
        assert_eq!(record.run_command.as_deref(), Some(report.run_command.as_str()));
        assert_eq!(record.source_url.as_deref(), Some("https://github.com/o/r"));

        let lines = runner.command_lines();
        let build_index = lines.iter().position(|l| l.starts_with("docker build")).unwrap();
        let probe_index = lines.iter().position(|l| l.starts_with("docker images -q")).unwrap();
        assert!(probe_index < build_index);
    }

    #[test]
    fn test_existing_dockerfile_untouched_and_stdio_has_no_ports() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(DOCKERFILE_NAME), "FROM original").unwrap();
        let runtime = CliRuntime::for_kind(MockCommandRunner::new(), RuntimeKind::Docker);
        let plan = plan::validate(&plan_json(true, "stdio"), "o-r").unwrap();

        let outcome = BuildExecutor::new(&runtime, RuntimeKind::Docker)
            .build(BuildRequest {
                plan: &plan,
                source_dir: temp.path(),
                installation_dir: temp.path(),
                installation_name: "o-r",
                source_url: None,
            })
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(temp.path().join(DOCKERFILE_NAME)).unwrap(),
            "FROM original"
        );
        match outcome {
            BuildOutcome::Built(report) => {
                assert!(report.ports.is_empty());
                assert!(!report.run_command.contains("-p "));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(DockerfileStatus::for_plan(&plan).to_string(), "Using existing Dockerfile");
    }

    #[test]
    fn test_failed_build_is_reported_and_recorded() {
        let temp = TempDir::new().unwrap();
        let runner = MockCommandRunner::new();
        runner.respond(
            &["docker", "build"],
            CommandOutput::new(1, "Step 1/2 : FROM python", "pip install failed"),
        );
        let runtime = CliRuntime::for_kind(runner.clone(), RuntimeKind::Docker);
        let plan = plan::validate(&plan_json(false, "sse"), "o-r").unwrap();

        let outcome = BuildExecutor::new(&runtime, RuntimeKind::Docker)
            .build(BuildRequest {
                plan: &plan,
                source_dir: temp.path(),
                installation_dir: temp.path(),
                installation_name: "o-r",
                source_url: None,
            })
            .unwrap();

        match outcome {
            BuildOutcome::Failed(failure) => {
                assert_eq!(failure.exit_code, 1);
                assert_eq!(failure.stderr, "pip install failed");
                assert_eq!(failure.stdout, "Step 1/2 : FROM python");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            metadata::load(temp.path()).unwrap().status,
            InstallationStatus::BuildFailed
        );
        assert!(temp.path().join(DOCKERFILE_NAME).exists());
        assert!(!runner.ran(&["docker", "images", "--format"]));
    }

    #[test]
    fn test_rebuild_uses_recorded_context() {
        let temp = TempDir::new().unwrap();
        let context = temp.path().join("src").join("server");
        std::fs::create_dir_all(&context).unwrap();
        let plan = plan::validate(&plan_json(false, "sse"), "o-r-server").unwrap();
        let mut record = InstallationMetadata::from_plan(&plan, "o-r-server", None, &context, Utc::now());

        let runner = MockCommandRunner::new();
        let runtime = CliRuntime::for_kind(runner.clone(), RuntimeKind::Docker);
        let outcome = BuildExecutor::new(&runtime, RuntimeKind::Docker)
            .rebuild(&mut record, temp.path())
            .unwrap();

        assert!(outcome.is_built());
        let context = context.to_string_lossy().to_string();
        assert!(runner.ran(&["docker", "build", "-t", "mcp-o-r", context.as_str()]));
        let saved = metadata::load(temp.path()).unwrap();
        assert_eq!(saved.status, InstallationStatus::ReadyToRun);
        assert!(saved.updated_at.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_generated_dockerfile_never_written_through_symlink() {
        let temp = TempDir::new().unwrap();
        let host_file = temp.path().join("bashrc");
        std::fs::write(&host_file, "export SAFE=1").unwrap();
        let checkout = temp.path().join("checkout");
        std::fs::create_dir_all(&checkout).unwrap();
        std::os::unix::fs::symlink(&host_file, checkout.join(DOCKERFILE_NAME)).unwrap();

        let runner = MockCommandRunner::new();
        let runtime = CliRuntime::for_kind(runner.clone(), RuntimeKind::Docker);
        let plan = plan::validate(&plan_json(false, "sse"), "o-r").unwrap();

        let err = BuildExecutor::new(&runtime, RuntimeKind::Docker)
            .build(BuildRequest {
                plan: &plan,
                source_dir: &checkout,
                installation_dir: temp.path(),
                installation_name: "o-r",
                source_url: None,
            })
            .unwrap_err();

        assert!(err.to_string().contains("symbolic link"), "{err}");
        assert_eq!(std::fs::read_to_string(&host_file).unwrap(), "export SAFE=1");
        assert!(runner.calls().is_empty());
        assert!(!is_regular_file(&checkout.join(DOCKERFILE_NAME)));
    }
}
