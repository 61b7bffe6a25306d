//! Install command implementation
//!
//! Implements `sinstaller install <url>`: resolves the reference, picks a
//! planner, and hands off to the orchestrator.

use crate::cli::{CliContext, OutputFormat};
use crate::commands::{envelope, manager, print_json};
use crate::ui::spinner::PlainSpinner;
use crate::ui::summary;
use anyhow::Result;
use sinstaller_core::build::BuildOutcome;
use sinstaller_core::config::SinstallerConfig;
use sinstaller_core::planner::{FilePlanner, Planner, PromptPlanner};
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Install command arguments
#[derive(Debug, Clone)]
pub struct InstallArgs {
    /// GitHub repository URL
    pub url: String,
    /// Replace an existing installation of the same name
    pub force: bool,
    /// Pre-authored plan
    pub plan_file: Option<PathBuf>,
    /// Analysis text accompanying `plan_file`
    pub analysis_file: Option<PathBuf>,
}

/// Planner for this invocation: plan file, then command, then URL
pub fn select_planner(args: &InstallArgs, config: &SinstallerConfig) -> Option<Box<dyn Planner>> {
    if let Some(plan_file) = &args.plan_file {
        let mut planner = FilePlanner::new(plan_file);
        if let Some(analysis_file) = &args.analysis_file {
            planner = planner.with_analysis(analysis_file);
        }
        return Some(Box::new(planner));
    }
    if let Some(argv) = &config.planner_command {
        return Some(Box::new(PromptPlanner::command(argv.clone())));
    }
    config
        .planner_url
        .as_ref()
        .map(|url| Box::new(PromptPlanner::http(url.clone())) as Box<dyn Planner>)
}

/// Execute the install command
#[instrument(skip(context))]
pub async fn execute_install(args: InstallArgs, context: &CliContext) -> Result<bool> {
    let planner = select_planner(&args, &context.config);
    debug!(
        planner = planner.as_ref().map(|p| p.name()).unwrap_or("none"),
        "Planner selected"
    );

    let spinner = context
        .spinner
        .then(|| PlainSpinner::start(&format!("Installing MCP server from {}…", args.url)));

    let result = manager(context)
        .install(&args.url, args.force, planner.as_deref())
        .await;

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            if let Some(spinner) = spinner {
                spinner.fail_with_message("Installation failed");
            }
            return Err(err.into());
        }
    };

    let success = report.build.is_built();
    if let Some(spinner) = spinner {
        if success {
            spinner.finish_with_message(&format!("Built {}", report.installation_name));
        } else {
            spinner.fail_with_message("Docker build failed");
        }
    }

    match context.output {
        OutputFormat::Json => {
            let error = match &report.build {
                BuildOutcome::Built(_) => None,
                BuildOutcome::Failed(_) => Some("Docker build failed"),
            };
            print_json(&envelope(success, error, &report)?)?;
        }
        OutputFormat::Text => println!("{}", summary::install(&report)),
    }
    Ok(success)
}
