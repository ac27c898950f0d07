//! Provider adapters
//!
//! One adapter per backend kind, all answering `complete(request) -> text`
//! and reporting failures as `ProviderError`. Adapters are built per call from
//! the current settings, so model and credential changes apply immediately.

pub mod anthropic;
pub mod ollama;
pub mod openai;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use studymint_common::{LlmSettings, ProviderSettings, Result};
use tracing::debug;

use crate::error::ProviderError;
use crate::types::CompletionRequest;

pub use anthropic::AnthropicAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;

/// Supported backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Anthropic Messages API
    Anthropic,
    /// OpenAI Chat Completions API
    OpenAi,
    /// Ollama native API
    Ollama,
    /// Self-hosted OpenAI-compatible server
    Local,
}

impl ProviderKind {
    /// All kinds, in display order
    pub const ALL: [ProviderKind; 4] = [Self::Anthropic, Self::OpenAi, Self::Ollama, Self::Local];

    /// Canonical configuration name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Local => "local",
        }
    }

    /// Settings block for this kind
    pub fn settings<'a>(&self, llm: &'a LlmSettings) -> &'a ProviderSettings {
        match self {
            Self::Anthropic => &llm.anthropic,
            Self::OpenAi => &llm.openai,
            Self::Ollama => &llm.ollama,
            Self::Local => &llm.local,
        }
    }

    /// Environment variable holding the credential
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Ollama => "OLLAMA_API_KEY",
            Self::Local => "LOCAL_LLM_API_KEY",
        }
    }

    /// Hosted providers refuse anonymous requests
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::Anthropic | Self::OpenAi)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "local" | "self-hosted" | "selfhosted" => Ok(Self::Local),
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }
}

/// Adapter for one backend, bound to the settings of the current call
#[derive(Debug)]
pub enum ProviderAdapter {
    Anthropic(AnthropicAdapter),
    OpenAi(OpenAiAdapter),
    Ollama(OllamaAdapter),
    Local(OpenAiAdapter),
}

impl ProviderAdapter {
    /// Build the adapter for `kind` from the current settings
    ///
    /// A missing credential for a hosted provider fails here, at call time.
    pub fn resolve(
        kind: ProviderKind,
        llm: &LlmSettings,
        client: &Client,
    ) -> std::result::Result<Self, ProviderError> {
        let endpoint = Endpoint::new(kind, llm, client.clone())?;
        Ok(match kind {
            ProviderKind::Anthropic => Self::Anthropic(AnthropicAdapter::new(endpoint)),
            ProviderKind::OpenAi => Self::OpenAi(OpenAiAdapter::new(endpoint)),
            ProviderKind::Ollama => Self::Ollama(OllamaAdapter::new(endpoint)),
            ProviderKind::Local => Self::Local(OpenAiAdapter::new(endpoint)),
        })
    }

    /// Backend kind
    pub fn kind(&self) -> ProviderKind {
        self.endpoint().kind
    }

    /// Model the adapter will call
    pub fn model(&self) -> &str {
        &self.endpoint().model
    }

    fn endpoint(&self) -> &Endpoint {
        match self {
            Self::Anthropic(a) => &a.endpoint,
            Self::OpenAi(a) | Self::Local(a) => &a.endpoint,
            Self::Ollama(a) => &a.endpoint,
        }
    }

    /// Run one completion; the answer comes back trimmed
    pub async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, ProviderError> {
        match self {
            Self::Anthropic(a) => a.complete(request).await,
            Self::OpenAi(a) | Self::Local(a) => a.complete(request).await,
            Self::Ollama(a) => a.complete(request).await,
        }
    }
}

/// Resolved connection details shared by all adapters
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub kind: ProviderKind,
    pub client: Client,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

impl Endpoint {
    fn new(kind: ProviderKind, llm: &LlmSettings, client: Client) -> std::result::Result<Self, ProviderError> {
        let settings = kind.settings(llm);

        if kind.requires_api_key() && settings.api_key.is_none() {
            return Err(ProviderError::NotConfigured(format!(
                "{} is not set",
                kind.api_key_var()
            )));
        }

        if settings.model.trim().is_empty() {
            return Err(ProviderError::NotConfigured(format!("no model configured for {}", kind)));
        }

        Ok(Self {
            kind,
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            max_output_tokens: llm.max_output_tokens,
            timeout: Duration::from_secs(llm.timeout_secs.max(1)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Send a JSON body and decode a JSON answer, mapping failures to categories
async fn send_json<B, R>(builder: RequestBuilder, body: &B) -> std::result::Result<R, ProviderError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = builder.json(body).send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_http_status(status.as_u16(), &body));
    }

    response
        .json::<R>()
        .await
        .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

/// Trim the answer and reject empty ones
fn answer_text(kind: ProviderKind, text: &str) -> std::result::Result<String, ProviderError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::InvalidResponse(format!("Empty response from {}", kind)));
    }
    debug!("Received response from {} - Length: {}", kind, trimmed.len());
    Ok(trimmed.to_string())
}

/// Calling seam between the gateway and the network
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run one completion attempt against `kind` using `settings`
    async fn complete(
        &self,
        kind: ProviderKind,
        settings: &LlmSettings,
        request: &CompletionRequest,
    ) -> std::result::Result<String, ProviderError>;
}

/// Production backend over HTTP
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
}

impl HttpBackend {
    /// Create the backend with a pooled HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    async fn complete(
        &self,
        kind: ProviderKind,
        settings: &LlmSettings,
        request: &CompletionRequest,
    ) -> std::result::Result<String, ProviderError> {
        let adapter = ProviderAdapter::resolve(kind, settings, &self.client)?;
        debug!(
            "Sending completion request - Provider: {}, Model: {}, Prompt length: {}",
            adapter.kind(),
            adapter.model(),
            request.prompt.len()
        );
        adapter.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("Anthropic".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!(" openai ".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("self-hosted".parse::<ProviderKind>().unwrap(), ProviderKind::Local);
        assert_eq!(
            "bard".parse::<ProviderKind>().unwrap_err(),
            ProviderError::UnknownProvider("bard".to_string())
        );
    }

    #[test]
    fn test_kind_round_trips_through_name() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_resolve_requires_hosted_credentials() {
        let settings = LlmSettings::default();
        let client = Client::new();

        let err = ProviderAdapter::resolve(ProviderKind::OpenAi, &settings, &client).unwrap_err();
        assert_eq!(err, ProviderError::NotConfigured("OPENAI_API_KEY is not set".to_string()));

        // self-hosted endpoints may run without a key
        let adapter = ProviderAdapter::resolve(ProviderKind::Local, &settings, &client).unwrap();
        assert_eq!(adapter.kind(), ProviderKind::Local);
        assert_eq!(adapter.model(), "local-model");
    }

    #[test]
    fn test_resolve_reads_current_settings() {
        let mut settings = LlmSettings::default();
        settings.anthropic.api_key = Some("key".to_string());
        settings.anthropic.model = "claude-3-opus-latest".to_string();

        let adapter = ProviderAdapter::resolve(ProviderKind::Anthropic, &settings, &Client::new()).unwrap();
        assert_eq!(adapter.model(), "claude-3-opus-latest");
    }

    #[test]
    fn test_answer_text_trims_and_rejects_empty() {
        assert_eq!(answer_text(ProviderKind::Ollama, "  ok \n").unwrap(), "ok");
        assert!(matches!(
            answer_text(ProviderKind::Ollama, " \n"),
            Err(ProviderError::InvalidResponse(_))
        ));
    }
}
