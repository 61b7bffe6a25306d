//! HTTP planner backend
//!
//! Posts each prompt as JSON to an operator-configured endpoint:
//!
//! ```json
//! {"system": "...", "prompt": "...", "max_tokens": 1500}
//! ```
//!
//! and accepts either `{"text": "..."}` or a plain-text body as the reply.
//! A bearer token is sent when configured.

use super::{Completion, Prompt};
use crate::errors::PlannerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Environment variable holding the bearer token for the planner endpoint
pub const TOKEN_ENV: &str = "SINSTALLER_PLANNER_TOKEN";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    system: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    text: String,
}

#[derive(Debug, Clone)]
pub struct HttpCompletion {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpCompletion {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token,
        }
    }

    /// Backend for `endpoint` using the token from [`TOKEN_ENV`], if set
    pub fn from_env(endpoint: impl Into<String>) -> Self {
        let token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());
        Self::new(endpoint, token)
    }
}

#[async_trait]
impl Completion for HttpCompletion {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn complete(&self, prompt: &Prompt) -> Result<String, PlannerError> {
        let body = CompletionRequest {
            system: &prompt.system,
            prompt: &prompt.user,
            max_tokens: prompt.max_tokens,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("Request timeout for planner endpoint {}", self.endpoint)
            } else if e.is_connect() {
                format!("Connection failed for planner endpoint {}", self.endpoint)
            } else {
                format!("Planner request to {} failed: {}", self.endpoint, e)
            };
            PlannerError::Request { message }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| PlannerError::Request {
            message: format!("Failed to read planner reply: {}", e),
        })?;

        if !status.is_success() {
            return Err(PlannerError::Request {
                message: format!("Planner endpoint returned {}: {}", status, text.trim()),
            });
        }

        let reply = match serde_json::from_str::<CompletionReply>(&text) {
            Ok(parsed) => parsed.text,
            Err(_) => text,
        };
        if reply.trim().is_empty() {
            return Err(PlannerError::Request {
                message: "Planner endpoint returned an empty reply".to_string(),
            });
        }
        debug!(bytes = reply.len(), "Planner replied");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prompt() -> Prompt {
        Prompt {
            system: "sys".to_string(),
            user: "analyze".to_string(),
            max_tokens: 10,
        }
    }

    #[tokio::test]
    async fn test_json_reply_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/plan"))
            .and(header("authorization", "Bearer s3cret"))
            .and(body_json(serde_json::json!({
                "system": "sys", "prompt": "analyze", "max_tokens": 10
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "It is a Python server"})))
            .mount(&server)
            .await;

        let backend = HttpCompletion::new(format!("{}/plan", server.uri()), Some("s3cret".to_string()));
        assert_eq!(backend.complete(&prompt()).await.unwrap(), "It is a Python server");
    }

    #[tokio::test]
    async fn test_plain_text_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("```json\n{}\n```"))
            .mount(&server)
            .await;

        let backend = HttpCompletion::new(server.uri(), None);
        assert_eq!(backend.complete(&prompt()).await.unwrap(), "```json\n{}\n```");
    }

    #[tokio::test]
    async fn test_error_status_is_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = HttpCompletion::new(server.uri(), None)
            .complete(&prompt())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));
    }
}
