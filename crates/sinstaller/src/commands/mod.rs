//! Command implementations
//!
//! Each subcommand returns whether it succeeded. Results go to stdout, as a
//! single JSON object `{"success": bool, ...}` with `--output json` or as a
//! human-readable summary otherwise. Logs stay on stderr.

pub mod delete;
pub mod install;
pub mod list;
pub mod update;

use crate::cli::{CliContext, OutputFormat};
use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use sinstaller_core::errors::SinstallerError;
use sinstaller_core::lifecycle::InstallationManager;
use sinstaller_core::process::SystemCommandRunner;

/// Orchestrator over the real git and container runtime binaries
pub(crate) fn manager(context: &CliContext) -> InstallationManager<SystemCommandRunner> {
    InstallationManager::new(&context.config, SystemCommandRunner::new())
}

/// `{"success": .., "error": .., <body fields>}`
pub(crate) fn envelope<T: Serialize>(success: bool, error: Option<&str>, body: &T) -> Result<Value> {
    let mut object = Map::new();
    object.insert("success".to_string(), Value::Bool(success));
    if let Some(error) = error {
        object.insert("error".to_string(), Value::String(error.to_string()));
    }
    match serde_json::to_value(body)? {
        Value::Object(fields) => object.extend(fields),
        Value::Null => {}
        other => {
            object.insert("result".to_string(), other);
        }
    }
    Ok(Value::Object(object))
}

pub(crate) fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Extra failure fields: `raw_response` for a rejected plan
fn failure_details(err: &anyhow::Error) -> Value {
    match err
        .downcast_ref::<SinstallerError>()
        .and_then(SinstallerError::raw_response)
    {
        Some(raw) => serde_json::json!({ "raw_response": raw }),
        None => Value::Null,
    }
}

/// Render an operation error in the selected output format
pub(crate) fn report_failure(context: &CliContext, err: &anyhow::Error) -> Result<()> {
    tracing::debug!("Operation failed: {:?}", err);
    match context.output {
        OutputFormat::Json => print_json(&envelope(
            false,
            Some(err.to_string().as_str()),
            &failure_details(err),
        )?),
        OutputFormat::Text => {
            eprintln!("{}", crate::ui::summary::failure(&err.to_string()));
            Ok(())
        }
    }
}
