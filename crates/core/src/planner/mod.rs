//! Planning collaborators
//!
//! The installer does not understand projects itself. A [`Planner`] produces
//! a free-text analysis of the fetched source and then a raw JSON execution
//! plan, which the caller validates with [`crate::plan::validate`].
//!
//! Implementations:
//! - [`PromptPlanner`] builds prompts from a [`survey::SourceSurvey`] and
//!   sends them to a [`Completion`] backend ([`CommandCompletion`] runs an
//!   operator-configured program, [`HttpCompletion`] posts to an endpoint)
//! - [`FilePlanner`] returns a pre-authored plan read from disk

pub mod command;
pub mod file;
pub mod http;
pub mod prompt;
pub mod survey;

pub use command::CommandCompletion;
pub use file::FilePlanner;
pub use http::HttpCompletion;
pub use prompt::Prompt;

use crate::build::{is_regular_file, DOCKERFILE_NAME};
use crate::errors::PlannerError;
use crate::reference::RepositoryReference;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// What the planner is asked about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanningRequest {
    pub reference: RepositoryReference,
    pub installation_name: String,
    /// Project directory inside the checkout
    pub source_dir: PathBuf,
}

/// Produces analysis text and a raw execution plan for a fetched project
#[async_trait]
pub trait Planner: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Free-text understanding of the project
    async fn analyze(&self, request: &PlanningRequest) -> Result<String, PlannerError>;

    /// Raw plan payload; may be wrapped in a Markdown code fence
    async fn plan(&self, request: &PlanningRequest, analysis: &str) -> Result<String, PlannerError>;
}

/// Text completion backend
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, PlannerError>;
}

/// Planner that prompts a [`Completion`] backend
#[derive(Debug, Clone)]
pub struct PromptPlanner<C> {
    backend: C,
    name: String,
}

impl<C: Completion> PromptPlanner<C> {
    pub fn new(backend: C, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
        }
    }
}

impl PromptPlanner<CommandCompletion> {
    /// Planner running `argv` for each prompt
    pub fn command(argv: Vec<String>) -> Self {
        let name = argv.first().cloned().unwrap_or_else(|| "command".to_string());
        Self::new(CommandCompletion::new(argv), name)
    }
}

impl PromptPlanner<HttpCompletion> {
    /// Planner posting each prompt to `endpoint`
    pub fn http(endpoint: impl Into<String>) -> Self {
        Self::new(HttpCompletion::from_env(endpoint), "http")
    }
}

#[async_trait]
impl<C: Completion> Planner for PromptPlanner<C> {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(planner = %self.name, installation = %request.installation_name))]
    async fn analyze(&self, request: &PlanningRequest) -> Result<String, PlannerError> {
        let source_dir = request.source_dir.clone();
        let survey = tokio::task::spawn_blocking(move || survey::SourceSurvey::collect(&source_dir))
            .await
            .map_err(|e| PlannerError::Request {
                message: format!("Source survey task failed: {}", e),
            })?;
        debug!(files = survey.files.len(), readme = survey.readme.is_some(), "Surveyed source");

        let prompt = prompt::analysis_prompt(request, &survey);
        self.backend.complete(&prompt).await
    }

    #[instrument(skip_all, fields(planner = %self.name, installation = %request.installation_name))]
    async fn plan(&self, request: &PlanningRequest, analysis: &str) -> Result<String, PlannerError> {
        let dockerfile = request.source_dir.join(DOCKERFILE_NAME);
        let existing = if is_regular_file(&dockerfile) {
            Some(
                tokio::fs::read_to_string(&dockerfile)
                    .await
                    .map_err(|source| PlannerError::Io {
                        path: dockerfile.clone(),
                        source,
                    })?,
            )
        } else {
            None
        };

        let prompt = prompt::plan_prompt(request, analysis, existing.as_deref());
        self.backend.complete(&prompt).await
    }
}
