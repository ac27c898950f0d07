//! OpenAI Chat Completions adapter
//!
//! Also serves self-hosted OpenAI-compatible servers (vLLM, llama.cpp server,
//! LM Studio), where the credential is optional.

use crate::error::ProviderError;
use crate::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, CompletionRequest};

use super::{answer_text, send_json, Endpoint};

/// OpenAI-compatible adapter
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    pub(crate) endpoint: Endpoint,
}

impl OpenAiAdapter {
    pub(crate) fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// Build request for the Chat Completions API
    pub fn build_request(&self, request: &CompletionRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(request.prompt.clone()));

        ChatCompletionRequest {
            model: self.endpoint.model.clone(),
            messages,
            max_tokens: self.endpoint.max_output_tokens,
            temperature: request.temperature,
        }
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = self.build_request(request);
        let mut builder = self
            .endpoint
            .client
            .post(self.endpoint.url("/chat/completions"))
            .timeout(self.endpoint.timeout);

        if let Some(api_key) = &self.endpoint.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response: ChatCompletionResponse = send_json(builder, &body).await?;
        let text = response
            .text()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;
        answer_text(self.endpoint.kind, text)
    }
}
