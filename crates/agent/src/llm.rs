use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tarifftok_core::config::{LlmConfig, LlmProvider};
use thiserror::Error;
use tracing::debug;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_PROMPT_LOG_CHARS: usize = 2_000;

/// One chat completion: a system prompt plus a single user message.
#[derive(Clone, Debug)]
pub struct LlmRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
}

impl LlmRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.2,
            max_tokens: None,
            json_mode: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError>;
}

#[async_trait]
impl LlmClient for Arc<dyn LlmClient> {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        (**self).complete(request).await
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),
    #[error("response error: {0}")]
    Response(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("llm provider `{0}` does not use an http client")]
    NotRemote(&'static str),
}

/// Where and how to send OpenAI-style chat completion requests.
#[derive(Clone, Debug)]
pub struct HttpLlmClientConfig {
    pub endpoint: String,
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub headers: HeaderMap,
}

impl HttpLlmClientConfig {
    /// Resolves the endpoint and auth headers for a configured provider.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        let api_key = config.api_key.as_ref().map(|key| key.expose_secret().to_string());
        let base_url = config.base_url.as_deref().map(|url| url.trim_end_matches('/'));

        let (endpoint, model) = match config.provider {
            LlmProvider::Offline => return Err(LlmError::NotRemote(config.provider.as_str())),
            LlmProvider::OpenAi => {
                if let Some(key) = &api_key {
                    headers.insert(AUTHORIZATION, header_value(&format!("Bearer {key}"))?);
                }
                let base = base_url.unwrap_or(OPENAI_BASE_URL);
                (format!("{base}/chat/completions"), Some(config.model.clone()))
            }
            LlmProvider::AzureOpenAi => {
                if let Some(key) = &api_key {
                    headers.insert(HeaderName::from_static("api-key"), header_value(key)?);
                }
                let base = base_url.unwrap_or_default();
                let deployment = config.deployment.as_deref().unwrap_or(config.model.as_str());
                (
                    format!(
                        "{base}/openai/deployments/{deployment}/chat/completions?api-version={}",
                        config.api_version
                    ),
                    None,
                )
            }
            LlmProvider::Ollama => {
                let base = base_url.unwrap_or("http://localhost:11434");
                (format!("{base}/v1/chat/completions"), Some(config.model.clone()))
            }
        };

        Ok(Self { endpoint, model, timeout_secs: config.timeout_secs, headers })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, LlmError> {
    HeaderValue::from_str(value).map_err(|error| LlmError::Http(error.to_string()))
}

pub struct HttpLlmClient {
    client: reqwest::Client,
    config: HttpLlmClientConfig,
}

impl HttpLlmClient {
    pub fn new(config: HttpLlmClientConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Http(error.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Self::new(HttpLlmClientConfig::from_config(config)?)
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        let mut headers = self.config.headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        debug!(
            event_name = "llm.request.sent",
            endpoint = %self.config.endpoint,
            user = %truncate_for_log(&request.user, MAX_PROMPT_LOG_CHARS),
            "sending chat completion"
        );

        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: request.system },
                ChatMessage { role: "user", content: request.user },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::Http(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Response(format!("HTTP {status}: {text}")));
        }

        let text = response.text().await.map_err(|error| LlmError::Http(error.to_string()))?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|error| LlmError::Serialization(error.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Response("missing choices".to_string()))
    }
}

/// Remote client for the configured provider; `None` in offline mode.
pub fn build_llm_client(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>, LlmError> {
    match config.provider {
        LlmProvider::Offline => Ok(None),
        LlmProvider::OpenAi | LlmProvider::AzureOpenAi | LlmProvider::Ollama => {
            let client: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::from_config(config)?);
            Ok(Some(client))
        }
    }
}

/// Scripted client for tests and demos.
#[derive(Clone, Debug)]
pub struct MockLlmClient {
    pub response: Result<String, String>,
    pub delay: Option<Duration>,
}

impl MockLlmClient {
    pub fn replying(response: impl Into<String>) -> Self {
        Self { response: Ok(response.into()), delay: None }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { response: Err(message.into()), delay: None }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _request: LlmRequest) -> Result<String, LlmError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone().map_err(LlmError::Response)
    }
}

/// Outermost `{...}` span of a model reply, tolerating prose or code fences.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
