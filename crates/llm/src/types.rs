use serde::{Deserialize, Serialize};

/// Provider-neutral completion request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    /// User prompt
    pub prompt: String,

    /// Optional system instruction
    pub system: Option<String>,

    /// Sampling temperature (0.0 - 1.0)
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Create a request with only a prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Set the system instruction
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Result of the map-reduce summarization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Final reduced summary
    pub text: String,

    /// Whether the input was cut to fit the document budget
    pub truncated: bool,

    /// Number of chunks summarized in the map phase
    pub chunk_count: usize,
}

// ---------------------------------------------------------------------------
// Ollama /api/generate
// ---------------------------------------------------------------------------

/// Ollama generate request
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    /// Model name (e.g., "llama3.2", "gemma2")
    pub model: String,

    /// Prompt text
    pub prompt: String,

    /// System instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Disable streaming
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Generation options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerateOptions>,
}

/// Generation options
#[derive(Debug, Clone, Serialize, Default)]
pub struct GenerateOptions {
    /// Temperature (0.0 - 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

/// Ollama generate response
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    /// Generated text
    pub response: String,

    /// Whether generation is complete
    #[serde(default)]
    pub done: bool,
}

// ---------------------------------------------------------------------------
// Anthropic /v1/messages
// ---------------------------------------------------------------------------

/// Anthropic Messages request
#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Anthropic Messages response
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// One block of an Anthropic response
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl MessagesResponse {
    /// Concatenated text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible /chat/completions
// ---------------------------------------------------------------------------

/// Role-tagged chat message, shared by the Anthropic and OpenAI shapes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Chat completion response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Text of the first choice
    pub fn text(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.message.content.as_deref())
    }
}
