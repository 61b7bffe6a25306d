//! Delete command implementation

use crate::cli::{CliContext, OutputFormat};
use crate::commands::{envelope, manager, print_json};
use crate::ui::summary;
use anyhow::Result;
use tracing::{instrument, warn};

/// Execute the delete command
///
/// Succeeds once the installation existed, even when individual cleanup
/// steps failed; those are listed in the report.
#[instrument(skip(context))]
pub async fn execute_delete(name: &str, context: &CliContext) -> Result<bool> {
    let report = manager(context).delete(name).await?;

    for outcome in report.cleanup_results.iter().filter(|o| !o.is_clean()) {
        warn!("{}", outcome);
    }

    match context.output {
        OutputFormat::Json => print_json(&envelope(true, None, &report)?)?,
        OutputFormat::Text => println!("{}", summary::delete(&report)),
    }
    Ok(true)
}
