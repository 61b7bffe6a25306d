//! Pre-authored plan backend

use super::{Planner, PlanningRequest};
use crate::errors::PlannerError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Analysis text reported when no analysis file is given
pub const DEFAULT_ANALYSIS: &str = "Execution plan supplied by the operator; no analysis was performed.";

/// Planner returning a plan (and optionally an analysis) read from files
#[derive(Debug, Clone)]
pub struct FilePlanner {
    plan_path: PathBuf,
    analysis_path: Option<PathBuf>,
}

impl FilePlanner {
    pub fn new(plan_path: impl Into<PathBuf>) -> Self {
        Self {
            plan_path: plan_path.into(),
            analysis_path: None,
        }
    }

    pub fn with_analysis(mut self, analysis_path: impl Into<PathBuf>) -> Self {
        self.analysis_path = Some(analysis_path.into());
        self
    }
}

async fn read(path: &Path) -> Result<String, PlannerError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PlannerError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[async_trait]
impl Planner for FilePlanner {
    fn name(&self) -> &str {
        "plan-file"
    }

    async fn analyze(&self, _request: &PlanningRequest) -> Result<String, PlannerError> {
        match &self.analysis_path {
            Some(path) => read(path).await,
            None => Ok(DEFAULT_ANALYSIS.to_string()),
        }
    }

    async fn plan(&self, _request: &PlanningRequest, _analysis: &str) -> Result<String, PlannerError> {
        read(&self.plan_path).await
    }
}
