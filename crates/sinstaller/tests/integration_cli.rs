//! CLI integration tests
//!
//! Every invocation gets an isolated `--home`; planner and runtime
//! environment variables are removed so the host setup cannot leak in.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn sinstaller(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sinstaller").unwrap();
    cmd.arg("--home")
        .arg(home.path())
        .env_remove("SINSTALLER_HOME")
        .env_remove("SINSTALLER_PLANNER")
        .env_remove("SINSTALLER_PLANNER_URL")
        .env_remove("SINSTALLER_RUNTIME")
        .env_remove("SINSTALLER_LOG_FORMAT");
    cmd
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be a single JSON object")
}

#[test]
fn test_help_output() {
    let mut cmd = Command::cargo_bin("sinstaller").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("MCP server installer"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn test_version_output() {
    let mut cmd = Command::cargo_bin("sinstaller").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "sinstaller {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_default_output() {
    let home = TempDir::new().unwrap();
    sinstaller(&home)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Run 'sinstaller --help' to see available commands.",
        ));
}

#[test]
fn test_list_empty_text() {
    let home = TempDir::new().unwrap();
    sinstaller(&home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No MCP servers installed yet."));
}

#[test]
fn test_list_empty_json() {
    let home = TempDir::new().unwrap();
    let output = sinstaller(&home)
        .args(["--output", "json", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["success"], true);
    assert_eq!(json["count"], 0);
    assert_eq!(json["servers"], serde_json::json!([]));
    assert_eq!(json["message"], "No MCP servers installed yet.");
}

#[test]
fn test_delete_unknown_server_fails() {
    let home = TempDir::new().unwrap();
    sinstaller(&home)
        .args(["delete", "ghost"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains(
            "Operation failed: Server 'ghost' not found.",
        ));
}

#[test]
fn test_update_unknown_server_json() {
    let home = TempDir::new().unwrap();
    let output = sinstaller(&home)
        .args(["--output", "json", "update", "ghost"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let json = stdout_json(&output);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Server 'ghost' not found.");
}

#[test]
fn test_install_malformed_url() {
    let home = TempDir::new().unwrap();
    let output = sinstaller(&home)
        .args(["--output", "json", "install", "https://gitlab.com/acme/demo"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let json = stdout_json(&output);
    assert_eq!(json["success"], false);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("Invalid GitHub URL format"));
}

#[test]
fn test_install_without_planner_has_no_side_effects() {
    let home = TempDir::new().unwrap();
    sinstaller(&home)
        .args(["install", "https://github.com/acme/demo"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains(
            "No request context available for analysis",
        ));
    assert!(!home.path().join("servers").join("acme-demo").exists());
}

#[test]
fn test_invalid_config_file_is_reported() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join("config.toml"), "runtime = [").unwrap();
    sinstaller(&home)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config.toml"));
}

#[cfg(unix)]
mod with_fake_tools {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    const FAKE_GIT: &str = r##"#!/bin/sh
case "$1" in
  clone)
    for last; do :; done
    mkdir -p "$last"
    echo "# demo server" > "$last/README.md"
    ;;
  -C)
    echo "https://github.com/acme/demo.git"
    ;;
esac
exit 0
"##;

    const FAKE_DOCKER: &str = r#"#!/bin/sh
case "$1" in
  images)
    if [ "$2" = "--format" ]; then
      echo "mcp-sinstaller-acme-demo:latest	42MB	1 second ago"
    fi
    ;;
  build)
    if [ -n "$FAKE_BUILD_FAIL" ]; then
      echo "Step 1/2 : FROM node:20"
      echo "npm ERR! missing script: build" >&2
      exit 3
    fi
    echo "Successfully built 0123456789ab"
    ;;
esac
exit 0
"#;

    const STDIO_PLAN: &str = r#"{
  "has_existing_dockerfile": false,
  "dockerfile_content": "FROM node:20\nCOPY . /app\nCMD [\"node\", \"/app/index.js\"]",
  "image_name": "mcp-sinstaller-acme-demo",
  "container_name": "mcp-acme-demo-container",
  "ports": {},
  "environment_variables": {"NODE_ENV": "production"},
  "required_secrets": ["DEMO_API_KEY"],
  "volumes": {},
  "startup_command": null,
  "health_check": null,
  "transport_type": "stdio"
}"#;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    struct Fixture {
        home: TempDir,
        git: PathBuf,
        docker: PathBuf,
        plan: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let home = TempDir::new().unwrap();
            let tools = home.path().join("tools");
            std::fs::create_dir_all(&tools).unwrap();
            let git = script(&tools, "git", FAKE_GIT);
            let docker = script(&tools, "docker", FAKE_DOCKER);
            let plan = tools.join("plan.json");
            std::fs::write(&plan, STDIO_PLAN).unwrap();
            Self {
                home,
                git,
                docker,
                plan,
            }
        }

        fn cmd(&self) -> Command {
            let mut cmd = sinstaller(&self.home);
            cmd.arg("--git-path")
                .arg(&self.git)
                .arg("--runtime-path")
                .arg(&self.docker);
            cmd
        }

        fn install(&self) -> Command {
            let mut cmd = self.cmd();
            cmd.args(["install", "https://github.com/acme/demo", "--plan-file"])
                .arg(&self.plan);
            cmd
        }
    }

    #[test]
    fn test_install_list_delete_round() {
        let fixture = Fixture::new();

        fixture
            .install()
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Successfully built Docker image for MCP server 'acme-demo'!",
            ))
            .stdout(predicate::str::contains("- Generated new Dockerfile"))
            .stdout(predicate::str::contains("- Ports: none (STDIO)"))
            .stdout(predicate::str::contains(
                "docker run -i --rm --name mcp-acme-demo-container -e NODE_ENV=production \
                 -e DEMO_API_KEY=${DEMO_API_KEY} mcp-sinstaller-acme-demo",
            ));

        let install_dir = fixture.home.path().join("servers").join("acme-demo");
        assert!(install_dir.join("Dockerfile").is_file());
        assert!(install_dir.join("metadata.json").is_file());

        // A second install without --force is rejected
        fixture
            .install()
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));

        let output = fixture.cmd().args(["--output", "json", "list"]).output().unwrap();
        let json = stdout_json(&output);
        assert_eq!(json["count"], 1);
        assert_eq!(json["servers"][0]["status"], "OK");
        assert_eq!(json["servers"][0]["transport"], "STDIO");
        assert_eq!(
            json["servers"][0]["repository"],
            "https://github.com/acme/demo.git"
        );

        fixture
            .cmd()
            .args(["delete", "acme-demo"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Cleanup completed for MCP server 'acme-demo':",
            ))
            .stdout(predicate::str::contains("✓ Removed repository:"));
        assert!(!install_dir.exists());
    }

    #[test]
    fn test_build_failure_reports_output_and_exit_code() {
        let fixture = Fixture::new();
        let output = fixture
            .install()
            .env("FAKE_BUILD_FAIL", "1")
            .args(["--output", "json"])
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(1));
        let json = stdout_json(&output);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Docker build failed");
        assert_eq!(json["build"]["status"], "failed");
        assert_eq!(json["build"]["exit_code"], 3);
        assert!(json["build"]["stderr"]
            .as_str()
            .unwrap()
            .contains("missing script"));
        assert!(json["analysis"].as_str().unwrap().contains("supplied by the operator"));

        let metadata: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(
                fixture
                    .home
                    .path()
                    .join("servers/acme-demo/metadata.json"),
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(metadata["status"], "build_failed");
    }

    #[test]
    fn test_unparseable_plan_shows_planner_output() {
        let fixture = Fixture::new();
        std::fs::write(&fixture.plan, "Sorry, I cannot produce JSON: MARKER_TEXT").unwrap();

        let output = fixture.install().args(["--output", "json"]).output().unwrap();
        assert_eq!(output.status.code(), Some(1));
        let json = stdout_json(&output);
        assert_eq!(json["success"], false);
        assert_eq!(json["raw_response"], "Sorry, I cannot produce JSON: MARKER_TEXT");
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid JSON in Docker plan:"));

        let install_dir = fixture.home.path().join("servers").join("acme-demo");
        assert!(install_dir.join("README.md").is_file());
        assert!(!install_dir.join("metadata.json").exists());

        fixture
            .install()
            .arg("--force")
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "Raw response: Sorry, I cannot produce JSON: MARKER_TEXT",
            ));
    }

    #[test]
    fn test_update_rebuilds_installed_server() {
        let fixture = Fixture::new();
        fixture.install().assert().success();

        fixture
            .cmd()
            .args(["update", "acme-demo"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Successfully updated MCP server 'acme-demo'!",
            ))
            .stdout(predicate::str::contains("42MB"));
    }
}
