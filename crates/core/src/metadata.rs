//! Installation metadata persistence
//!
//! Each installation directory holds a `metadata.json` file that is the single
//! source of truth for update, delete, and list. Secrets are recorded by
//! name only.
//!
//! Writes go to a temporary sibling file which is then renamed over the
//! target, so a failed write never leaves a truncated `metadata.json` behind.
//! Readers distinguish an absent file ([`MetadataError::NotFound`]) from an
//! unparsable one ([`MetadataError::Corrupt`]).

use crate::errors::MetadataError;
use crate::plan::{ExecutionPlan, TransportType};
use crate::run_command::RunSettings;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Metadata file name inside an installation directory
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Lifecycle state of an installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallationStatus {
    Cloned,
    Analyzed,
    Planned,
    ImageBuilt,
    ReadyToRun,
    BuildFailed,
}

impl InstallationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloned => "cloned",
            Self::Analyzed => "analyzed",
            Self::Planned => "planned",
            Self::ImageBuilt => "image_built",
            Self::ReadyToRun => "ready_to_run",
            Self::BuildFailed => "build_failed",
        }
    }
}

impl std::fmt::Display for InstallationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationMetadata {
    #[serde(default, alias = "server_name")]
    pub installation_name: String,
    /// Reference string the installation was created from
    #[serde(default)]
    pub source_url: Option<String>,
    /// Build context directory (the subpath inside the checkout, if any)
    pub repository_path: PathBuf,
    pub image_name: String,
    pub container_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: IndexMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub environment_variables: IndexMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub required_secrets: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub volumes: IndexMap<String, String>,
    #[serde(default)]
    pub startup_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<serde_json::Value>,
    #[serde(default)]
    pub transport_type: TransportType,
    pub status: InstallationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_instructions: Option<String>,
}

impl InstallationMetadata {
    /// Initial record for a freshly validated plan
    pub fn from_plan(
        plan: &ExecutionPlan,
        installation_name: &str,
        source_url: Option<&str>,
        repository_path: &Path,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            installation_name: installation_name.to_string(),
            source_url: source_url.map(str::to_string),
            repository_path: repository_path.to_path_buf(),
            image_name: plan.image_name.clone(),
            container_name: plan.container_name.clone(),
            ports: plan.ports.clone(),
            environment_variables: plan.environment_variables.clone(),
            required_secrets: plan.required_secrets.clone(),
            volumes: plan.volumes.clone(),
            startup_command: plan.startup_command.clone(),
            health_check: plan.health_check.clone(),
            transport_type: plan.transport_type,
            status: InstallationStatus::ImageBuilt,
            created_at,
            updated_at: None,
            run_command: None,
            run_instructions: None,
        }
    }
}

impl<'a> From<&'a InstallationMetadata> for RunSettings<'a> {
    fn from(metadata: &'a InstallationMetadata) -> Self {
        Self {
            container_name: &metadata.container_name,
            image_name: &metadata.image_name,
            ports: &metadata.ports,
            environment_variables: &metadata.environment_variables,
            required_secrets: &metadata.required_secrets,
            volumes: &metadata.volumes,
            startup_command: metadata.startup_command.as_deref(),
            transport_type: metadata.transport_type,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Path of the metadata file inside `installation_dir`
pub fn metadata_path(installation_dir: &Path) -> PathBuf {
    installation_dir.join(METADATA_FILE_NAME)
}

/// Whether `installation_dir` has a metadata file
pub fn exists(installation_dir: &Path) -> bool {
    metadata_path(installation_dir).is_file()
}

/// Load the metadata record of `installation_dir`
#[instrument(skip_all, fields(dir = %installation_dir.display()))]
pub fn load(installation_dir: &Path) -> Result<InstallationMetadata, MetadataError> {
    let path = metadata_path(installation_dir);
    if !path.exists() {
        return Err(MetadataError::NotFound { path });
    }

    let content = std::fs::read_to_string(&path).map_err(|source| MetadataError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|e| MetadataError::Corrupt {
        path,
        message: e.to_string(),
    })
}

/// Persist `metadata` into `installation_dir`, replacing any previous record
#[instrument(skip_all, fields(dir = %installation_dir.display(), status = %metadata.status))]
pub fn save(installation_dir: &Path, metadata: &InstallationMetadata) -> Result<(), MetadataError> {
    let path = metadata_path(installation_dir);
    let content = serde_json::to_string_pretty(metadata)?;

    let temp_path = installation_dir.join(format!(
        ".{}.tmp-{}",
        METADATA_FILE_NAME,
        std::process::id()
    ));
    if let Err(source) = std::fs::write(&temp_path, content) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(MetadataError::Io {
            path: temp_path,
            source,
        });
    }
    std::fs::rename(&temp_path, &path).map_err(|source| {
        let _ = std::fs::remove_file(&temp_path);
        MetadataError::Io {
            path: path.clone(),
            source,
        }
    })?;

    debug!("Wrote metadata to {}", path.display());
    Ok(())
}
