//! LLM backends behind a single request/response seam.
//!
//! The resolver only ever sees `ResolverBackend::query`; everything about HTTP
//! shapes, auth headers and provider quirks stays in this module.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mailfn_core::config::{LlmConfig, LlmProvider};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);
const ERROR_BODY_PREVIEW_CHARS: usize = 200;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),
    #[error("backend reply could not be read: {0}")]
    MalformedEnvelope(String),
}

#[async_trait]
pub trait ResolverBackend: Send + Sync {
    fn provider(&self) -> &'static str;

    /// One prompt, one completion. Implementations must give up after
    /// `timeout`.
    async fn query(&self, prompt: &str, timeout: Duration) -> Result<String, BackendError>;

    async fn health(&self) -> Result<(), BackendError>;
}

pub fn build_client(config: &LlmConfig) -> Arc<dyn ResolverBackend> {
    let base_url = config.base_url.clone().unwrap_or_default();
    match config.provider {
        LlmProvider::Ollama => Arc::new(OllamaClient::new(base_url, config.model.clone())),
        LlmProvider::OpenAi => Arc::new(OpenAiClient::new(
            if base_url.trim().is_empty() { "https://api.openai.com/v1".to_string() } else { base_url },
            config.model.clone(),
            config.api_key.clone().unwrap_or_else(|| SecretString::from(String::new())),
        )),
    }
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> BackendError {
    if error.is_timeout() {
        BackendError::Timeout(timeout)
    } else {
        BackendError::Unavailable(error.to_string())
    }
}

async fn status_error(response: reqwest::Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let preview: String = body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
    BackendError::Unavailable(format!("status {status}: {preview}"))
}

fn trim_base(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: trim_base(&base_url.into()), model: model.into() }
    }
}

#[async_trait]
impl ResolverBackend for OllamaClient {
    fn provider(&self) -> &'static str {
        "ollama"
    }

    async fn query(&self, prompt: &str, timeout: Duration) -> Result<String, BackendError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
            options: json!({ "temperature": 0 }),
        };

        debug!(
            event_name = "llm.request",
            provider = "ollama",
            model = %self.model,
            prompt_chars = prompt.len(),
            "sending prompt"
        );
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|error| transport_error(error, timeout))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: GenerateResponse = response.json().await.map_err(|error| {
            if error.is_timeout() {
                BackendError::Timeout(timeout)
            } else {
                BackendError::MalformedEnvelope(error.to_string())
            }
        })?;
        Ok(body.response.trim().to_string())
    }

    async fn health(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|error| transport_error(error, HEALTH_TIMEOUT))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }
}

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    response_format: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            base_url: trim_base(&base_url.into()),
            model: model.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ResolverBackend for OpenAiClient {
    fn provider(&self) -> &'static str {
        "openai"
    }

    async fn query(&self, prompt: &str, timeout: Duration) -> Result<String, BackendError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You route requests to functions and reply with a single JSON object.",
                },
                ChatMessage { role: "user", content: prompt },
            ],
            response_format: json!({ "type": "json_object" }),
        };

        debug!(
            event_name = "llm.request",
            provider = "openai",
            model = %self.model,
            prompt_chars = prompt.len(),
            "sending prompt"
        );
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|error| transport_error(error, timeout))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            if error.is_timeout() {
                BackendError::Timeout(timeout)
            } else {
                BackendError::MalformedEnvelope(error.to_string())
            }
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| BackendError::MalformedEnvelope("reply has no message content".into()))
    }

    async fn health(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|error| transport_error(error, HEALTH_TIMEOUT))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }
}

/// Offline client that replays canned replies in order.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    fallback: Option<Result<String, BackendError>>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, BackendError>>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            fallback: None,
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers every prompt with the same reply.
    pub fn repeating(reply: Result<String, BackendError>) -> Self {
        Self { fallback: Some(reply), ..Self::new(Vec::new()) }
    }

    /// Sleeps before answering, to simulate a slow backend.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(prompts) => prompts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ResolverBackend for ScriptedClient {
    fn provider(&self) -> &'static str {
        "scripted"
    }

    async fn query(&self, prompt: &str, _timeout: Duration) -> Result<String, BackendError> {
        match self.prompts.lock() {
            Ok(mut prompts) => prompts.push(prompt.to_string()),
            Err(poisoned) => poisoned.into_inner().push(prompt.to_string()),
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = match self.replies.lock() {
            Ok(mut replies) => replies.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.or_else(|| self.fallback.clone()).unwrap_or_else(|| {
            Err(BackendError::Unavailable("scripted client has no reply left".to_string()))
        })
    }

    async fn health(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
