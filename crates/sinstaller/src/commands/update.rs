//! Update command implementation

use crate::cli::{CliContext, OutputFormat};
use crate::commands::{envelope, manager, print_json};
use crate::ui::spinner::PlainSpinner;
use crate::ui::summary;
use anyhow::Result;
use sinstaller_core::build::BuildOutcome;
use tracing::instrument;

/// Execute the update command
#[instrument(skip(context))]
pub async fn execute_update(name: &str, context: &CliContext) -> Result<bool> {
    let spinner = context
        .spinner
        .then(|| PlainSpinner::start(&format!("Updating {}…", name)));

    let report = match manager(context).update(name).await {
        Ok(report) => report,
        Err(err) => {
            if let Some(spinner) = spinner {
                spinner.fail_with_message("Update failed");
            }
            return Err(err.into());
        }
    };

    let success = report.build.is_built();
    if let Some(spinner) = spinner {
        if success {
            spinner.finish_with_message(&format!("Rebuilt {}", name));
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
        OutputFormat::Text => println!("{}", summary::update(&report)),
    }
    Ok(success)
}
