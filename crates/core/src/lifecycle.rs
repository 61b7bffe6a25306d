//! Installation lifecycle orchestration
//!
//! [`InstallationManager`] composes reference resolution, source fetching,
//! planning, plan validation, and image builds into the four lifecycle
//! operations: install, update, delete, and list.
//!
//! State machine for one installation:
//!
//! ```text
//! absent -> cloned -> analyzed -> planned -> image_built -> ready_to_run
//!                                                        \-> build_failed
//! ```
//!
//! Each installation owns `<servers_dir>/<installation_name>/`, holding the
//! cloned source tree and `metadata.json`. Nothing is retried and nothing is
//! rolled back: a failed step leaves the tree on disk for inspection and the
//! operator re-runs the operation (typically `install` with `force`).
//!
//! Operations on the same installation name are serialized through a keyed
//! async mutex; different names proceed independently.

use crate::build::{BuildExecutor, BuildOutcome, BuildRequest, DockerfileStatus};
use crate::config::SinstallerConfig;
use crate::docker::{CleanupOutcome, CliRuntime, ResourceKind};
use crate::errors::{LifecycleError, MetadataError, Result};
use crate::git::GitFetcher;
use crate::metadata::{self, InstallationMetadata};
use crate::plan;
use crate::planner::{Planner, PlanningRequest};
use crate::process::CommandRunner;
use crate::reference::RepositoryReference;
use crate::runtime::RuntimeKind;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

/// Message reported by an empty listing
pub const EMPTY_LISTING_MESSAGE: &str = "No MCP servers installed yet.";

/// Container name used for cleanup when metadata is unavailable
pub fn fallback_container_name(installation_name: &str) -> String {
    format!("mcp-{}-container", installation_name)
}

/// Image name used for cleanup when metadata is unavailable
pub fn fallback_image_name(installation_name: &str) -> String {
    format!("mcp-sinstaller-{}", installation_name)
}

/// Result of `install`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallReport {
    pub installation_name: String,
    pub url: String,
    pub installation_dir: PathBuf,
    pub dockerfile_status: DockerfileStatus,
    /// Planner analysis, kept on both build outcomes for diagnosis
    pub analysis: String,
    pub build: BuildOutcome,
}

/// Result of `update`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateReport {
    pub installation_name: String,
    pub build: BuildOutcome,
    pub metadata: InstallationMetadata,
}

/// Result of `delete`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub installation_name: String,
    /// Container, image, then directory removal, in that order
    pub cleanup_results: Vec<CleanupOutcome>,
}

/// Healthy installation as shown by `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerSummary {
    pub name: String,
    pub repository: String,
    /// Upper-cased transport type
    pub transport: String,
    /// `None` when no ports are recorded
    pub ports: Option<IndexMap<String, String>>,
    pub required_secrets: Vec<String>,
    pub created: String,
}

/// Installation whose metadata could not be used
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenInstallation {
    pub name: String,
    pub error: String,
}

/// One row of `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status")]
pub enum ListEntry {
    #[serde(rename = "OK")]
    Ok(ServerSummary),
    #[serde(rename = "ERROR")]
    Error(BrokenInstallation),
}

impl ListEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Ok(summary) => &summary.name,
            Self::Error(broken) => &broken.name,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// Result of `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListReport {
    pub servers: Vec<ListEntry>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Git and container runtime handles, cloned into blocking tasks
#[derive(Debug, Clone)]
struct Tools<R> {
    git: GitFetcher<R>,
    runtime: CliRuntime<R>,
    kind: RuntimeKind,
}

impl<R: CommandRunner> Tools<R> {
    /// Fresh checkout of `reference` at `dir`, replacing any previous tree
    ///
    /// Returns the build context inside the checkout.
    fn checkout(
        &self,
        reference: &RepositoryReference,
        servers_dir: &Path,
        dir: &Path,
    ) -> Result<PathBuf> {
        if dir.exists() {
            warn!("Removing existing installation at {}", dir.display());
            std::fs::remove_dir_all(dir).map_err(|source| LifecycleError::Filesystem {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        std::fs::create_dir_all(servers_dir).map_err(|source| LifecycleError::Filesystem {
            path: servers_dir.to_path_buf(),
            source,
        })?;

        self.git.fetch(reference, dir)?;
        info!("Cloned {} into {}", reference, dir.display());

        let source_dir = reference.source_dir(dir);
        ensure_within_checkout(dir, &source_dir)?;
        Ok(source_dir)
    }

    /// Pull and rebuild from the recorded metadata
    fn refresh(&self, name: &str, dir: &Path) -> Result<(BuildOutcome, InstallationMetadata)> {
        let mut record = match metadata::load(dir) {
            Ok(record) => record,
            Err(MetadataError::NotFound { .. }) => {
                return Err(LifecycleError::MissingMetadata {
                    name: name.to_string(),
                }
                .into())
            }
            Err(MetadataError::Corrupt { message, .. }) => {
                return Err(LifecycleError::CorruptMetadata {
                    name: name.to_string(),
                    message,
                }
                .into())
            }
            Err(other) => return Err(other.into()),
        };

        self.git.refresh(dir)?;
        let build = BuildExecutor::new(&self.runtime, self.kind).rebuild(&mut record, dir)?;
        Ok((build, record))
    }

    fn cleanup(&self, name: &str, dir: &Path) -> Vec<CleanupOutcome> {
        let (container_name, image_name) = match metadata::load(dir) {
            Ok(record) => (record.container_name, record.image_name),
            Err(e) => {
                warn!("Cleaning up {} without metadata: {}", name, e);
                (fallback_container_name(name), fallback_image_name(name))
            }
        };

        let mut outcomes = vec![
            self.runtime.remove_container_if_present(&container_name),
            self.runtime.remove_image_if_present(&image_name),
        ];
        outcomes.push(match std::fs::remove_dir_all(dir) {
            Ok(()) => CleanupOutcome::removed(ResourceKind::Repository, dir.display().to_string()),
            Err(e) => CleanupOutcome::Error {
                kind: ResourceKind::Repository,
                message: e.to_string(),
            },
        });
        outcomes
    }

    fn list(&self, servers_dir: &Path) -> Result<ListReport> {
        let mut dirs = Vec::new();
        if servers_dir.is_dir() {
            let entries = std::fs::read_dir(servers_dir).map_err(|source| LifecycleError::Filesystem {
                path: servers_dir.to_path_buf(),
                source,
            })?;
            dirs = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_dir())
                .collect();
            dirs.sort();
        }

        let servers: Vec<ListEntry> = dirs.iter().map(|dir| self.describe(dir)).collect();
        let message = servers.is_empty().then(|| EMPTY_LISTING_MESSAGE.to_string());
        Ok(ListReport {
            count: servers.len(),
            servers,
            message,
        })
    }

    fn describe(&self, dir: &Path) -> ListEntry {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match metadata::load(dir) {
            Ok(record) => ListEntry::Ok(ServerSummary {
                repository: self
                    .git
                    .remote_url(dir)
                    .unwrap_or_else(|| "unknown".to_string()),
                transport: record.transport_type.as_str().to_uppercase(),
                ports: (!record.ports.is_empty()).then_some(record.ports),
                required_secrets: record.required_secrets,
                created: record.created_at.to_rfc3339(),
                name,
            }),
            Err(MetadataError::NotFound { .. }) => ListEntry::Error(BrokenInstallation {
                name,
                error: "Missing metadata.json (corrupted installation)".to_string(),
            }),
            Err(MetadataError::Corrupt { message, .. }) => ListEntry::Error(BrokenInstallation {
                name,
                error: format!("Failed to read metadata ({})", message),
            }),
            Err(other) => ListEntry::Error(BrokenInstallation {
                name,
                error: format!("Failed to read metadata ({})", other),
            }),
        }
    }
}

/// Reject a build context that resolves outside the checkout through a symlink
fn ensure_within_checkout(checkout: &Path, source_dir: &Path) -> Result<()> {
    let (Ok(root), Ok(context)) = (checkout.canonicalize(), source_dir.canonicalize()) else {
        return Ok(());
    };
    if context.starts_with(&root) {
        Ok(())
    } else {
        Err(LifecycleError::SourceOutsideCheckout {
            path: source_dir.to_path_buf(),
        }
        .into())
    }
}

type LockMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Exclusive hold on one installation name
///
/// The name's entry is dropped from the lock map once nobody holds or
/// waits for it.
struct NameGuard<'a> {
    locks: &'a LockMap,
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks
            .get(&self.name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.name);
        }
    }
}

/// Owns the mapping from installation name to installation directory
pub struct InstallationManager<R> {
    servers_dir: PathBuf,
    tools: Tools<R>,
    locks: LockMap,
}

impl<R> std::fmt::Debug for InstallationManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationManager")
            .field("servers_dir", &self.servers_dir)
            .field("runtime_kind", &self.tools.kind)
            .finish()
    }
}

impl<R: CommandRunner + Clone + 'static> InstallationManager<R> {
    /// Manager over the directories and tools named by `config`
    pub fn new(config: &SinstallerConfig, runner: R) -> Self {
        Self {
            servers_dir: config.servers_dir.clone(),
            tools: Tools {
                git: GitFetcher::with_git_path(runner.clone(), config.git_path.clone()),
                runtime: CliRuntime::with_runtime_path(runner, config.runtime_path.clone()),
                kind: config.runtime,
            },
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Manager with default tools rooted at `servers_dir`
    pub fn with_servers_dir(servers_dir: impl Into<PathBuf>, runner: R) -> Self {
        let servers_dir = servers_dir.into();
        let mut config = SinstallerConfig::with_home(&servers_dir);
        config.servers_dir = servers_dir;
        Self::new(&config, runner)
    }

    pub fn servers_dir(&self) -> &Path {
        &self.servers_dir
    }

    /// Directory owned by the installation `name`
    pub fn installation_dir(&self, name: &str) -> PathBuf {
        self.servers_dir.join(name)
    }

    async fn lock(&self, name: &str) -> NameGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        NameGuard {
            locks: &self.locks,
            name: name.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Run git, runtime, and filesystem work on the blocking pool
    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tools<R>) -> Result<T> + Send + 'static,
    {
        let tools = self.tools.clone();
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || span.in_scope(|| work(&tools)))
            .await
            .map_err(|e| LifecycleError::Task {
                message: e.to_string(),
            })?
    }

    /// Existing installation directory for a user-supplied name
    fn existing_dir(&self, name: &str) -> Result<PathBuf> {
        let single_component = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains('/')
            && !name.contains('\\');
        let dir = self.installation_dir(name);
        if !single_component || !dir.is_dir() {
            return Err(LifecycleError::NotFound {
                name: name.to_string(),
            }
            .into());
        }
        Ok(dir)
    }

    /// Install the server at `reference`
    ///
    /// With `force`, an existing installation directory of the same name is
    /// removed recursively first. That removal is irreversible.
    #[instrument(name = "installation.install", skip(self, planner), fields(installation))]
    pub async fn install(
        &self,
        reference: &str,
        force: bool,
        planner: Option<&dyn Planner>,
    ) -> Result<InstallReport> {
        let resolved = RepositoryReference::resolve(reference)?;
        let name = resolved.installation_name();
        tracing::Span::current().record("installation", name.as_str());
        let _guard = self.lock(&name).await;

        let dir = self.installation_dir(&name);
        let url = reference.trim().to_string();
        if dir.exists() && !force {
            let existing_source = metadata::load(&dir)
                .ok()
                .and_then(|m| m.source_url)
                .filter(|source| *source != url);
            return Err(LifecycleError::AlreadyExists {
                name,
                existing_source,
            }
            .into());
        }
        let planner = planner.ok_or(LifecycleError::NoContext)?;

        let source_dir = {
            let (reference, servers_dir, dir) =
                (resolved.clone(), self.servers_dir.clone(), dir.clone());
            self.blocking(move |tools| tools.checkout(&reference, &servers_dir, &dir))
                .await?
        };

        let request = PlanningRequest {
            source_dir: source_dir.clone(),
            installation_name: name.clone(),
            reference: resolved,
        };
        let analysis = planner.analyze(&request).await?;
        debug!(planner = planner.name(), bytes = analysis.len(), "Analysis complete");
        let raw_plan = planner.plan(&request, &analysis).await?;
        let plan = plan::validate(&raw_plan, &name)?;
        let dockerfile_status = DockerfileStatus::for_plan(&plan);

        let build = {
            let (dir, name, url) = (dir.clone(), name.clone(), url.clone());
            self.blocking(move |tools| {
                BuildExecutor::new(&tools.runtime, tools.kind).build(BuildRequest {
                    plan: &plan,
                    source_dir: &source_dir,
                    installation_dir: &dir,
                    installation_name: &name,
                    source_url: Some(&url),
                })
            })
            .await?
        };

        Ok(InstallReport {
            installation_name: name,
            url,
            installation_dir: dir,
            dockerfile_status,
            analysis,
            build,
        })
    }

    /// Pull the latest source for `name` and rebuild its image
    ///
    /// Lost or unreadable metadata is never reconstructed; the operator must
    /// reinstall.
    #[instrument(name = "installation.update", skip(self))]
    pub async fn update(&self, name: &str) -> Result<UpdateReport> {
        let _guard = self.lock(name).await;
        let dir = self.existing_dir(name)?;

        let owned = name.to_string();
        let (build, record) = self
            .blocking(move |tools| tools.refresh(&owned, &dir))
            .await?;

        Ok(UpdateReport {
            installation_name: name.to_string(),
            build,
            metadata: record,
        })
    }

    /// Remove the container, image, and directory of `name`
    ///
    /// Each cleanup step reports its own outcome; a failing step does not
    /// stop the others.
    #[instrument(name = "installation.delete", skip(self))]
    pub async fn delete(&self, name: &str) -> Result<DeleteReport> {
        let _guard = self.lock(name).await;
        let dir = self.existing_dir(name)?;

        let owned = name.to_string();
        let cleanup_results = self
            .blocking(move |tools| Ok(tools.cleanup(&owned, &dir)))
            .await?;
        info!("Deleted installation {}", name);

        Ok(DeleteReport {
            installation_name: name.to_string(),
            cleanup_results,
        })
    }

    /// Describe every installation under the servers directory
    ///
    /// Broken installations are reported as entries, never as a failure of
    /// the listing.
    #[instrument(name = "installation.list", skip(self))]
    pub async fn list(&self) -> Result<ListReport> {
        let servers_dir = self.servers_dir.clone();
        self.blocking(move |tools| tools.list(&servers_dir)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::MockCommandRunner;
    use tempfile::TempDir;

    #[test]
    fn test_fallback_names() {
        assert_eq!(fallback_container_name("o-r"), "mcp-o-r-container");
        assert_eq!(fallback_image_name("o-r"), "mcp-sinstaller-o-r");
    }

    #[tokio::test]
    async fn test_unsafe_names_are_not_found() {
        let temp = TempDir::new().unwrap();
        let manager = InstallationManager::with_servers_dir(temp.path(), MockCommandRunner::new());
        for name in ["", ".", "..", "a/b", "..\\x"] {
            let err = manager.delete(name).await.unwrap_err();
            assert!(err.to_string().contains("not found"), "{name}: {err}");
        }
    }

    #[tokio::test]
    async fn test_list_missing_base_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let manager = InstallationManager::with_servers_dir(
            temp.path().join("does-not-exist"),
            MockCommandRunner::new(),
        );
        let report = manager.list().await.unwrap();
        assert!(report.servers.is_empty());
        assert_eq!(report.count, 0);
        assert_eq!(report.message.as_deref(), Some(EMPTY_LISTING_MESSAGE));
    }

    #[test]
    fn test_list_entry_serialization() {
        let entry = ListEntry::Error(BrokenInstallation {
            name: "o-r".to_string(),
            error: "Missing metadata.json (corrupted installation)".to_string(),
        });
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["status"], "ERROR");
        assert_eq!(value["name"], "o-r");
        assert!(!entry.is_ok());
        assert_eq!(entry.name(), "o-r");
    }

    #[tokio::test]
    async fn test_same_name_operations_are_serialized() {
        let temp = TempDir::new().unwrap();
        let manager = InstallationManager::with_servers_dir(temp.path(), MockCommandRunner::new());

        let first = manager.lock("o-r").await;
        let other = tokio::time::timeout(std::time::Duration::from_millis(50), manager.lock("x-y")).await;
        assert!(other.is_ok());
        let same = tokio::time::timeout(std::time::Duration::from_millis(50), manager.lock("o-r")).await;
        assert!(same.is_err());
        drop(first);
        let same = tokio::time::timeout(std::time::Duration::from_millis(50), manager.lock("o-r")).await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn test_released_names_are_forgotten() {
        let temp = TempDir::new().unwrap();
        let manager = InstallationManager::with_servers_dir(temp.path(), MockCommandRunner::new());
        let tracked = |manager: &InstallationManager<MockCommandRunner>| manager.locks.lock().unwrap().len();

        let first = manager.lock("o-r").await;
        let other = manager.lock("x-y").await;
        assert_eq!(tracked(&manager), 2);
        drop(other);
        assert_eq!(tracked(&manager), 1);

        // A waiter keeps the entry alive until it is done too
        let waiter = manager.lock("o-r");
        tokio::pin!(waiter);
        assert!(tokio::time::timeout(std::time::Duration::from_millis(20), &mut waiter)
            .await
            .is_err());
        drop(first);
        let second = waiter.await;
        assert_eq!(tracked(&manager), 1);
        drop(second);
        assert_eq!(tracked(&manager), 0);

        for name in ["a-b", "c-d", "e-f"] {
            manager.delete(name).await.unwrap_err();
        }
        assert_eq!(tracked(&manager), 0);
    }
}
