//! List command implementation

use crate::cli::{CliContext, OutputFormat};
use crate::commands::{envelope, manager, print_json};
use crate::ui::summary;
use anyhow::Result;
use tracing::instrument;

/// Execute the list command
#[instrument(skip(context))]
pub async fn execute_list(context: &CliContext) -> Result<bool> {
    let report = manager(context).list().await?;

    match context.output {
        OutputFormat::Json => print_json(&envelope(true, None, &report)?)?,
        OutputFormat::Text => println!("{}", summary::list(&report)),
    }
    Ok(true)
}
