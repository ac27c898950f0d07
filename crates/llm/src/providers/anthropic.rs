//! Anthropic Messages API adapter

use crate::error::ProviderError;
use crate::types::{ChatMessage, CompletionRequest, MessagesRequest, MessagesResponse};

use super::{answer_text, send_json, Endpoint};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic (Claude) adapter
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    pub(crate) endpoint: Endpoint,
}

impl AnthropicAdapter {
    pub(crate) fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// Build request for the Messages API
    pub fn build_request(&self, request: &CompletionRequest) -> MessagesRequest {
        MessagesRequest {
            model: self.endpoint.model.clone(),
            max_tokens: self.endpoint.max_output_tokens,
            system: request.system.clone(),
            messages: vec![ChatMessage::user(request.prompt.clone())],
            temperature: request.temperature,
        }
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = self.build_request(request);
        let mut builder = self
            .endpoint
            .client
            .post(self.endpoint.url("/v1/messages"))
            .timeout(self.endpoint.timeout)
            .header("anthropic-version", ANTHROPIC_VERSION);

        if let Some(api_key) = &self.endpoint.api_key {
            builder = builder.header("x-api-key", api_key);
        }

        let response: MessagesResponse = send_json(builder, &body).await?;
        answer_text(self.endpoint.kind, &response.text())
    }
}
