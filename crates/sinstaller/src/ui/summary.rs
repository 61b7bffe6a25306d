//! Text rendering of lifecycle results
//!
//! Output contracts:
//! - Text mode: these summaries on stdout (failures on stderr)
//! - JSON mode: the reports are serialized directly; nothing here is used

use sinstaller_core::build::{BuildFailure, BuildOutcome};
use sinstaller_core::lifecycle::{DeleteReport, InstallReport, ListEntry, ListReport, UpdateReport};

/// `Operation failed: <message>`
pub fn failure(message: &str) -> String {
    format!("Operation failed: {}", message)
}

pub fn install(report: &InstallReport) -> String {
    let name = &report.installation_name;
    match &report.build {
        BuildOutcome::Built(built) => {
            let ports = if built.transport_type.is_stdio() {
                "none (STDIO)".to_string()
            } else {
                fmt_map(built.ports.iter())
            };
            format!(
                "Successfully built Docker image for MCP server '{name}'!\n\n\
                 Repository: {url}\n\
                 Location: {location}\n\n\
                 DOCKER IMAGE:\n\
                 - {dockerfile}\n\
                 - Image: {image}\n\
                 - Size & Created: {info}\n\
                 - Ports: {ports}\n\
                 - Environment Variables: {env}\n\
                 - Required Secrets: {secrets}\n\
                 - Metadata: {metadata}\n\n\
                 {instructions}",
                url = report.url,
                location = report.installation_dir.display(),
                dockerfile = report.dockerfile_status,
                image = built.image_name,
                info = built.image_info,
                env = fmt_list(&built.environment_variables),
                secrets = fmt_list(&built.required_secrets),
                metadata = built.metadata_path.display(),
                instructions = built.run_instructions,
            )
        }
        BuildOutcome::Failed(failed) => format!(
            "Docker build failed for MCP server '{name}'.\n\n\
             Analyze result: {analysis}\n\n\
             Repository: {url}\n\
             Location: {location}\n\n\
             {details}",
            analysis = report.analysis,
            url = report.url,
            location = report.installation_dir.display(),
            details = build_failure(failed),
        ),
    }
}

pub fn update(report: &UpdateReport) -> String {
    let name = &report.installation_name;
    match &report.build {
        BuildOutcome::Built(built) => format!(
            "Successfully updated MCP server '{name}'!\n\n\
             Docker image rebuilt:\n{info}\n\n\
             Run instructions:\n{instructions}",
            info = built.image_info,
            instructions = built.run_instructions.trim_start(),
        ),
        BuildOutcome::Failed(failed) => format!(
            "Docker build failed for MCP server '{name}'.\n\n\
             Location: {location}\n\n\
             {details}",
            location = report.metadata.repository_path.display(),
            details = build_failure(failed),
        ),
    }
}

fn build_failure(failed: &BuildFailure) -> String {
    let or = |text: &str, fallback: &str| {
        if text.trim().is_empty() {
            fallback.to_string()
        } else {
            text.trim_end().to_string()
        }
    };
    format!(
        "DOCKER ERROR:\nDocker build failed\n\n\
         STDOUT:\n{}\n\n\
         STDERR:\n{}\n\n\
         Return Code: {}",
        or(&failed.stdout, "No output"),
        or(&failed.stderr, "No errors"),
        failed.exit_code
    )
}

pub fn delete(report: &DeleteReport) -> String {
    let lines: Vec<String> = report.cleanup_results.iter().map(ToString::to_string).collect();
    format!(
        "Cleanup completed for MCP server '{}':\n\n{}",
        report.installation_name,
        lines.join("\n")
    )
}

pub fn list(report: &ListReport) -> String {
    if report.servers.is_empty() {
        return report
            .message
            .clone()
            .unwrap_or_else(|| sinstaller_core::lifecycle::EMPTY_LISTING_MESSAGE.to_string());
    }

    let entries: Vec<String> = report
        .servers
        .iter()
        .map(|entry| match entry {
            ListEntry::Error(broken) => format!("• {}: ERROR - {}", broken.name, broken.error),
            ListEntry::Ok(server) => {
                let ports = match &server.ports {
                    Some(ports) if !ports.is_empty() => fmt_map(ports.iter()),
                    _ => "none (STDIO)".to_string(),
                };
                format!(
                    "• {}\n  Repository: {}\n  Transport: {}\n  Ports: {}\n  Required Secrets: {}\n  Created: {}",
                    server.name,
                    server.repository,
                    server.transport,
                    ports,
                    fmt_list(&server.required_secrets),
                    server.created
                )
            }
        })
        .collect();

    format!(
        "Installed MCP servers ({}):\n\n{}",
        report.count,
        entries.join("\n\n")
    )
}

/// `8000 -> 8080, 9000 -> 9000`, or `none`
fn fmt_map<'a>(pairs: impl Iterator<Item = (&'a String, &'a String)>) -> String {
    let rendered: Vec<String> = pairs.map(|(k, v)| format!("{} -> {}", k, v)).collect();
    if rendered.is_empty() {
        "none".to_string()
    } else {
        rendered.join(", ")
    }
}

fn fmt_list(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
