//! OpenAI and Azure OpenAI service clients.
//!
//! This module is only available when the `openai` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::completion::{CompletionOptions, CompletionService, Message};
use crate::embedding::EmbeddingService;
use crate::error::{RagError, Result};

/// The default OpenAI API base URL.
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// The Azure OpenAI API version used when none is configured.
pub const DEFAULT_AZURE_API_VERSION: &str = "2023-05-15";

/// The default model for OpenAI embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// The default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Where requests go and how they authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// api.openai.com (or a compatible server) with bearer auth.
    OpenAi {
        /// API key.
        api_key: String,
        /// Base URL, e.g. `https://api.openai.com/v1`.
        base_url: String,
    },
    /// An Azure OpenAI resource with `api-key` header auth.
    Azure {
        /// API key.
        api_key: String,
        /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
        endpoint: String,
        /// Value of the `api-version` query parameter.
        api_version: String,
    },
}

impl Endpoint {
    /// api.openai.com with the given key.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::OpenAi { api_key: api_key.into(), base_url: OPENAI_API_BASE.into() }
    }

    /// An Azure OpenAI resource using [`DEFAULT_AZURE_API_VERSION`].
    pub fn azure(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::Azure {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            api_version: DEFAULT_AZURE_API_VERSION.into(),
        }
    }

    fn api_key(&self) -> &str {
        match self {
            Self::OpenAi { api_key, .. } | Self::Azure { api_key, .. } => api_key,
        }
    }

    /// URL for `operation` (`embeddings` or `chat/completions`). On Azure the
    /// model name is the deployment name.
    fn url(&self, model: &str, operation: &str) -> String {
        match self {
            Self::OpenAi { base_url, .. } => {
                format!("{}/{operation}", base_url.trim_end_matches('/'))
            }
            Self::Azure { endpoint, api_version, .. } => format!(
                "{}/openai/deployments/{model}/{operation}?api-version={api_version}",
                endpoint.trim_end_matches('/')
            ),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::OpenAi { api_key, .. } => request.bearer_auth(api_key),
            Self::Azure { api_key, .. } => request.header("api-key", api_key),
        }
    }

    fn provider(&self) -> &'static str {
        match self {
            Self::OpenAi { .. } => "OpenAI",
            Self::Azure { .. } => "AzureOpenAI",
        }
    }
}

/// Read a required environment variable.
fn env_var(provider: &str, name: &str) -> std::result::Result<String, String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("{name} environment variable not set for {provider}"))
}

fn http_client(timeout: Option<Duration>) -> std::result::Result<reqwest::Client, String> {
    let builder = reqwest::Client::builder();
    let builder = match timeout {
        Some(timeout) => builder.timeout(timeout),
        None => builder,
    };
    builder.build().map_err(|e| format!("failed to build HTTP client: {e}"))
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Send a JSON request and decode a JSON response, describing any failure
/// as a plain message.
async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    endpoint: &Endpoint,
    model: &str,
    operation: &str,
    body: &B,
) -> std::result::Result<R, String> {
    let response = endpoint
        .authorize(client.post(endpoint.url(model, operation)))
        .json(body)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                format!("request timed out: {e}")
            } else {
                format!("request failed: {e}")
            }
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail =
            serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
        return Err(format!("API returned {status}: {detail}"));
    }

    response.json().await.map_err(|e| format!("failed to parse response: {e}"))
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingService`] backed by the OpenAI / Azure OpenAI embeddings API.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAiEmbeddingService;
///
/// let service = OpenAiEmbeddingService::from_env()?;
/// let embedding = service.embed("hello world").await?;
/// ```
pub struct OpenAiEmbeddingService {
    client: reqwest::Client,
    endpoint: Endpoint,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAiEmbeddingService {
    /// Create a service for `endpoint` using the default model and dimensions.
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        if endpoint.api_key().is_empty() {
            return Err(RagError::embedding(endpoint.provider(), "API key must not be empty"));
        }
        let client = http_client(None).map_err(|m| RagError::embedding(endpoint.provider(), m))?;
        Ok(Self {
            client,
            endpoint,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a service from the environment.
    ///
    /// Uses Azure when `AZURE_OPENAI_ENDPOINT` is set (with
    /// `AZURE_OPENAI_API_KEY` and `AZURE_OPENAI_EMBEDDING_DEPLOYMENT`),
    /// otherwise `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let fail = |message: String| RagError::embedding("OpenAI", message);
        if let Ok(azure_endpoint) = env_var("AzureOpenAI", "AZURE_OPENAI_ENDPOINT") {
            let api_key = env_var("AzureOpenAI", "AZURE_OPENAI_API_KEY").map_err(fail)?;
            let deployment =
                env_var("AzureOpenAI", "AZURE_OPENAI_EMBEDDING_DEPLOYMENT").map_err(fail)?;
            Ok(Self::new(Endpoint::azure(azure_endpoint, api_key))?.with_model(deployment))
        } else {
            Self::new(Endpoint::openai(env_var("OpenAI", "OPENAI_API_KEY").map_err(fail)?))
        }
    }

    /// Set the model name (the deployment name on Azure).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// This also updates the value returned by [`dimensions()`](EmbeddingService::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Set a per-request timeout. A timed-out call is an embedding error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingService`] if the HTTP client cannot be built.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = http_client(Some(timeout))
            .map_err(|m| RagError::embedding(self.endpoint.provider(), m))?;
        Ok(self)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingService for OpenAiEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = self.endpoint.provider(), text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(self.endpoint.provider(), "API returned no data"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let provider = self.endpoint.provider();
        debug!(provider, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };
        let response: EmbeddingResponse =
            post_json(&self.client, &self.endpoint, &self.model, "embeddings", &request_body)
                .await
                .map_err(|message| {
                    error!(provider, error = %message, "embedding request failed");
                    RagError::embedding(provider, message)
                })?;

        let mut data = response.data;
        if data.len() != texts.len() {
            return Err(RagError::embedding(
                provider,
                format!("API returned {} embeddings for {} inputs", data.len(), texts.len()),
            ));
        }
        data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── Chat completions ───────────────────────────────────────────────

/// A [`CompletionService`] backed by the OpenAI / Azure OpenAI chat
/// completions API.
pub struct OpenAiCompletionService {
    client: reqwest::Client,
    endpoint: Endpoint,
    model: String,
}

impl OpenAiCompletionService {
    /// Create a service for `endpoint` using the default chat model.
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        if endpoint.api_key().is_empty() {
            return Err(RagError::completion(endpoint.provider(), "API key must not be empty"));
        }
        let client = http_client(None).map_err(|m| RagError::completion(endpoint.provider(), m))?;
        Ok(Self { client, endpoint, model: DEFAULT_CHAT_MODEL.into() })
    }

    /// Create a service from the environment.
    ///
    /// Uses Azure when `AZURE_OPENAI_ENDPOINT` is set (with
    /// `AZURE_OPENAI_API_KEY` and `DEPLOYMENT_NAME`), otherwise
    /// `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let fail = |message: String| RagError::completion("OpenAI", message);
        if let Ok(azure_endpoint) = env_var("AzureOpenAI", "AZURE_OPENAI_ENDPOINT") {
            let api_key = env_var("AzureOpenAI", "AZURE_OPENAI_API_KEY").map_err(fail)?;
            let deployment = env_var("AzureOpenAI", "DEPLOYMENT_NAME").map_err(fail)?;
            Ok(Self::new(Endpoint::azure(azure_endpoint, api_key))?.with_model(deployment))
        } else {
            Self::new(Endpoint::openai(env_var("OpenAI", "OPENAI_API_KEY").map_err(fail)?))
        }
    }

    /// Set the model name (the deployment name on Azure).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a per-request timeout. A timed-out call is a completion error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CompletionService`] if the HTTP client cannot be built.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = http_client(Some(timeout))
            .map_err(|m| RagError::completion(self.endpoint.provider(), m))?;
        Ok(self)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionService for OpenAiCompletionService {
    async fn complete(&self, messages: &[Message], options: CompletionOptions) -> Result<String> {
        let provider = self.endpoint.provider();
        debug!(provider, messages = messages.len(), model = %self.model, "chat completion");

        let request_body = ChatRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        let response: ChatResponse =
            post_json(&self.client, &self.endpoint, &self.model, "chat/completions", &request_body)
                .await
                .map_err(|message| {
                    error!(provider, error = %message, "completion request failed");
                    RagError::completion(provider, message)
                })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| RagError::completion(provider, "API returned no message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn azure_urls_target_the_deployment() {
        let endpoint = Endpoint::azure("https://res.openai.azure.com/", "key");
        assert_eq!(
            endpoint.url("embed-deploy", "embeddings"),
            "https://res.openai.azure.com/openai/deployments/embed-deploy/embeddings\
             ?api-version=2023-05-15"
        );
    }

    #[test]
    fn openai_urls_ignore_the_model() {
        let endpoint = Endpoint::openai("key");
        assert_eq!(
            endpoint.url("gpt-4o-mini", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(OpenAiEmbeddingService::new(Endpoint::openai("")).is_err());
        assert!(OpenAiCompletionService::new(Endpoint::openai("")).is_err());
    }

    #[test]
    fn timeout_builds_a_new_client() {
        let embedder = OpenAiEmbeddingService::new(Endpoint::openai("key"))
            .unwrap()
            .with_timeout(Duration::from_secs(5));
        assert!(embedder.is_ok());
        let completion = OpenAiCompletionService::new(Endpoint::openai("key"))
            .unwrap()
            .with_timeout(Duration::from_secs(5));
        assert!(completion.is_ok());
    }

    #[test]
    fn configured_dimensions_are_advertised_and_requested() {
        let service = OpenAiEmbeddingService::new(Endpoint::openai("key")).unwrap();
        assert_eq!(service.dimensions(), DEFAULT_DIMENSIONS);
        assert_eq!(service.request_dimensions, None);

        let service = service.with_dimensions(3072);
        assert_eq!(service.dimensions(), 3072);
        assert_eq!(service.request_dimensions, Some(3072));
    }
}
