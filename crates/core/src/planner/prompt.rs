//! Prompt construction for planning backends

use super::survey::SourceSurvey;
use super::PlanningRequest;
use serde::Serialize;

pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are an expert software engineer who knows how to build, \
deploy and run many kinds of projects. Pay close attention to the MCP transport type (STDIO or SSE); \
it decides how the server is containerized.";

pub const PLAN_SYSTEM_PROMPT: &str = "You are a DevOps expert. Reply with ONLY valid JSON: no explanations, \
no Markdown, no surrounding text. Return only the requested JSON object.";

pub const ANALYSIS_MAX_TOKENS: u32 = 2000;
pub const PLAN_MAX_TOKENS: u32 = 1500;

/// One request to a completion backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// Prompt asking for a free-text project analysis
pub fn analysis_prompt(request: &PlanningRequest, survey: &SourceSurvey) -> Prompt {
    let reference = &request.reference;
    let user = format!(
        "You are analyzing an MCP server project to learn how to build and run it.\n\
         \n\
         Repository: {owner}/{repo}\n\
         Branch: {branch}\n\
         Server name: {name}\n\
         Path in repo: {subpath}\n\
         Project location: {location}\n\
         \n\
         Describe the project in this format:\n\
         \n\
         PROJECT ANALYSIS:\n\
         - What this MCP server does\n\
         - Programming language and framework\n\
         - Key dependencies\n\
         - How to build or install it\n\
         - How to start the MCP server\n\
         - Configuration it needs\n\
         - Entry points and main files\n\
         - Transport type: STDIO or SSE (critical for the container setup)\n\
         \x20 * STDIO talks over standard input/output and needs no network ports\n\
         \x20 * SSE talks over HTTP and needs exposed ports\n\
         \x20 * Look for stdio transports, server-sent events, HTTP servers and port settings\n\
         \n\
         Understand the project well enough to containerize it successfully.\n\
         {survey}",
        owner = reference.owner,
        repo = reference.repo,
        branch = reference.branch,
        name = request.installation_name,
        subpath = reference.subpath,
        location = request.source_dir.display(),
        survey = survey.render(),
    );

    Prompt {
        system: ANALYSIS_SYSTEM_PROMPT.to_string(),
        user,
        max_tokens: ANALYSIS_MAX_TOKENS,
    }
}

fn plan_template(name: &str, existing: bool) -> String {
    let dockerfile_hint = if existing {
        "the existing Dockerfile content, with any wrong paths corrected"
    } else {
        "complete Dockerfile content for the project type you discovered"
    };
    format!(
        "{{\n\
         \x20 \"has_existing_dockerfile\": {existing},\n\
         \x20 \"dockerfile_content\": \"{dockerfile_hint}\",\n\
         \x20 \"image_name\": \"mcp-sinstaller-{name}\",\n\
         \x20 \"container_name\": \"mcp-{name}-container\",\n\
         \x20 \"ports\": {{\"8000\": \"8000\"}},\n\
         \x20 \"environment_variables\": {{}},\n\
         \x20 \"required_secrets\": [],\n\
         \x20 \"volumes\": {{}},\n\
         \x20 \"startup_command\": null,\n\
         \x20 \"health_check\": null,\n\
         \x20 \"transport_type\": \"stdio or sse, from the analysis\"\n\
         }}"
    )
}

/// Prompt asking for the JSON execution plan
///
/// When the project already ships a Dockerfile its content is included and
/// the backend is asked to keep it.
pub fn plan_prompt(request: &PlanningRequest, analysis: &str, existing_dockerfile: Option<&str>) -> Prompt {
    let location = request.source_dir.display();
    let template = plan_template(&request.installation_name, existing_dockerfile.is_some());

    let user = match existing_dockerfile {
        Some(dockerfile) => format!(
            "This MCP server project already has a Dockerfile. Review it and produce a structured Docker plan.\n\
             \n\
             PREVIOUS ANALYSIS:\n{analysis}\n\
             \n\
             PROJECT LOCATION: {location}\n\
             \n\
             EXISTING DOCKERFILE:\n{dockerfile}\n\
             \n\
             Respond with ONLY a JSON object shaped like this:\n{template}\n\
             \n\
             From the Dockerfile and the project, determine:\n\
             - Ports to publish (SSE/HTTP transport only)\n\
             - Environment variables and required secrets\n\
             - Transport type: \"stdio\" or \"sse\"\n\
             If a path in the Dockerfile is wrong, correct it.\n\
             \n\
             Return ONLY the JSON object."
        ),
        None => format!(
            "This MCP server project needs a Dockerfile. Analyze it and produce a complete Docker plan.\n\
             \n\
             PREVIOUS ANALYSIS:\n{analysis}\n\
             \n\
             PROJECT LOCATION: {location}\n\
             \n\
             Respond with ONLY a JSON object shaped like this:\n{template}\n\
             \n\
             First identify the technology stack (Python, Node.js, TypeScript, Go, ...), then:\n\
             - Write a Dockerfile suited to that stack\n\
             - Choose the transport: \"stdio\" (stdin/stdout) or \"sse\" (SSE/streamable HTTP)\n\
             - Publish ports only for the sse transport\n\
             - List any required secrets\n\
             \n\
             Return ONLY the JSON object."
        ),
    };

    Prompt {
        system: PLAN_SYSTEM_PROMPT.to_string(),
        user,
        max_tokens: PLAN_MAX_TOKENS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::RepositoryReference;
    use std::path::PathBuf;

    fn request() -> PlanningRequest {
        PlanningRequest {
            reference: RepositoryReference::resolve("https://github.com/o/r/tree/dev/servers/fetch").unwrap(),
            installation_name: "o-r-fetch".to_string(),
            source_dir: PathBuf::from("/servers/o-r-fetch/servers/fetch"),
        }
    }

    #[test]
    fn test_analysis_prompt_names_the_project() {
        let prompt = analysis_prompt(&request(), &SourceSurvey::default());
        assert!(prompt.user.contains("Repository: o/r"));
        assert!(prompt.user.contains("Server name: o-r-fetch"));
        assert!(prompt.user.contains("Path in repo: servers/fetch"));
        assert_eq!(prompt.max_tokens, ANALYSIS_MAX_TOKENS);
        assert_eq!(prompt.system, ANALYSIS_SYSTEM_PROMPT);
    }

    #[test]
    fn test_plan_prompt_variants() {
        let fresh = plan_prompt(&request(), "analysis text", None);
        assert!(fresh.user.contains("needs a Dockerfile"));
        assert!(fresh.user.contains("\"has_existing_dockerfile\": false"));
        assert!(fresh.user.contains("\"image_name\": \"mcp-sinstaller-o-r-fetch\""));
        assert!(fresh.user.contains("\"container_name\": \"mcp-o-r-fetch-container\""));

        let existing = plan_prompt(&request(), "analysis text", Some("FROM rust:1.80"));
        assert!(existing.user.contains("already has a Dockerfile"));
        assert!(existing.user.contains("FROM rust:1.80"));
        assert!(existing.user.contains("\"has_existing_dockerfile\": true"));
        assert_eq!(existing.system, PLAN_SYSTEM_PROMPT);
    }
}
