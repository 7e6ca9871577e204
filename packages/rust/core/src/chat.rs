//! Chat-completion capability and its OpenRouter implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use contentplan_shared::{
    AppConfig, ContentPlanError, OpenRouterConfig, Result, resolve_api_key,
};

/// A single system + user exchange returning the assistant's text.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Identifier used in errors and logs.
    fn provider_id(&self) -> &str;

    async fn complete(&self, system: &str, user: &str, model_hint: Option<&str>) -> Result<String>;
}

// ---------------------------------------------------------------------------
// OpenRouter
// ---------------------------------------------------------------------------

const PROVIDER_ID: &str = "openrouter";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// [`ChatCompletion`] over the OpenRouter `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenRouterChat {
    client: Client,
    api_key: String,
    endpoint: String,
    default_model: String,
}

impl OpenRouterChat {
    pub fn new(config: &OpenRouterConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ContentPlanError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            default_model: config.default_model.clone(),
        })
    }

    /// Build from the app config, reading the API key from its env var.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let api_key = resolve_api_key(config)?;
        Self::new(&config.openrouter, api_key)
    }

    fn failed(&self, message: impl Into<String>) -> ContentPlanError {
        ContentPlanError::chat_failed(PROVIDER_ID, message)
    }
}

#[async_trait]
impl ChatCompletion for OpenRouterChat {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    #[instrument(skip_all, fields(model = tracing::field::Empty))]
    async fn complete(&self, system: &str, user: &str, model_hint: Option<&str>) -> Result<String> {
        let model = model_hint.unwrap_or(&self.default_model);
        tracing::Span::current().record("model", model);

        let request = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "contentplan")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.failed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(self.failed(format!("API error ({status}): {snippet}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.failed(format!("unreadable response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| self.failed("response contained no completion"))?;

        debug!(response_len = content.len(), "chat completion received");
        Ok(content)
    }
}
