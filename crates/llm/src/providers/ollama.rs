use crate::error::ProviderError;
use crate::types::{CompletionRequest, GenerateOptions, GenerateRequest, GenerateResponse};

use super::{answer_text, send_json, Endpoint};

/// Ollama native API adapter
#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    pub(crate) endpoint: Endpoint,
}

impl OllamaAdapter {
    pub(crate) fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// Build a non-streaming generate request
    pub fn build_request(&self, request: &CompletionRequest) -> GenerateRequest {
        GenerateRequest {
            model: self.endpoint.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            stream: Some(false),
            options: Some(GenerateOptions {
                temperature: request.temperature,
                num_predict: i32::try_from(self.endpoint.max_output_tokens).ok(),
            }),
        }
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = self.build_request(request);
        let builder = self
            .endpoint
            .client
            .post(self.endpoint.url("/api/generate"))
            .timeout(self.endpoint.timeout);

        let result: GenerateResponse = send_json(builder, &body).await?;
        if !result.done {
            tracing::warn!("Ollama returned an unfinished generation for {}", self.endpoint.model);
        }

        answer_text(self.endpoint.kind, &result.response)
    }
}
