use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PlannerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of an LLM conversation; opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Raw completion from the provider.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub tokens_used: Option<i64>,
}

/// Opaque text generator. Failures propagate as a single error kind;
/// retry/fallback policy belongs to the caller.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, messages: &[ChatMessage], model: &str) -> Result<Completion>;
}

/// OpenAI-compatible chat-completions client.
pub struct HttpLlmClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    chat_path: String,
}

impl HttpLlmClient {
    /// `base_url` without a trailing slash; `chat_path` starting with "/"
    /// (e.g. "/v1/chat/completions").
    pub fn new(base_url: impl Into<String>, chat_path: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            chat_path: chat_path.into(),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, messages: &[ChatMessage], model: &str) -> Result<Completion> {
        let url = format!("{}{}", self.base_url, self.chat_path);
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
        });

        debug!(%model, "sending planner request");

        let mut req = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "planner API error");
            return Err(PlannerError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| PlannerError::Parse(e.to_string()))?;
        let text = api_resp
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PlannerError::Parse("response carried no choices".into()))?;

        Ok(Completion {
            text,
            tokens_used: api_resp.usage.map(|u| u.total_tokens),
        })
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: String,
}

#[derive(Deserialize)]
struct ApiUsage {
    total_tokens: i64,
}
