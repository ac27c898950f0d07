use crate::error::StudyMintError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Connection settings for one LLM backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Model name passed to the backend
    pub model: String,

    /// Base endpoint (no trailing slash)
    pub base_url: String,

    /// API credential, if the backend needs one
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl ProviderSettings {
    /// Create settings without a credential
    pub fn new(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Attach a credential
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// LLM gateway settings
///
/// Re-read on every gateway call so provider, model and credential changes
/// apply to the next request without a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Primary provider name (anthropic, openai, ollama, local)
    pub provider: String,

    /// Optional secondary provider
    pub fallback_provider: Option<String>,

    /// Anthropic Messages API
    pub anthropic: ProviderSettings,

    /// OpenAI Chat Completions API
    pub openai: ProviderSettings,

    /// Ollama native API
    pub ollama: ProviderSettings,

    /// Self-hosted OpenAI-compatible endpoint
    pub local: ProviderSettings,

    /// Maximum tokens the model may generate per call
    pub max_output_tokens: u32,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            fallback_provider: None,
            anthropic: ProviderSettings::new("claude-3-5-haiku-latest", "https://api.anthropic.com"),
            openai: ProviderSettings::new("gpt-4o-mini", "https://api.openai.com/v1"),
            ollama: ProviderSettings::new("llama3.2:latest", "http://localhost:11434"),
            local: ProviderSettings::new("local-model", "http://localhost:8000/v1"),
            max_output_tokens: 1024,
            timeout_secs: 300,
        }
    }
}

impl LlmSettings {
    /// Read settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let provider = |prefix: &str, default: ProviderSettings| ProviderSettings {
            model: get(&format!("{}_MODEL", prefix)).unwrap_or(default.model),
            base_url: get(&format!("{}_BASE_URL", prefix))
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(default.base_url),
            api_key: get(&format!("{}_API_KEY", prefix)),
        };

        Self {
            provider: get("LLM_PROVIDER").unwrap_or(defaults.provider),
            fallback_provider: get("LLM_FALLBACK_PROVIDER"),
            anthropic: provider("ANTHROPIC", defaults.anthropic),
            openai: provider("OPENAI", defaults.openai),
            ollama: provider("OLLAMA", defaults.ollama),
            local: provider("LOCAL_LLM", defaults.local),
            max_output_tokens: get("LLM_MAX_OUTPUT_TOKENS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_output_tokens),
            timeout_secs: get("LLM_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), StudyMintError> {
        if self.provider.trim().is_empty() {
            return Err(StudyMintError::config("LLM provider cannot be empty"));
        }

        for (name, settings) in [
            ("anthropic", &self.anthropic),
            ("openai", &self.openai),
            ("ollama", &self.ollama),
            ("local", &self.local),
        ] {
            if !settings.base_url.starts_with("http://") && !settings.base_url.starts_with("https://") {
                return Err(StudyMintError::config(format!(
                    "{} base URL must start with http:// or https://",
                    name
                )));
            }
        }

        if self.max_output_tokens == 0 {
            return Err(StudyMintError::config("LLM max output tokens cannot be 0"));
        }

        Ok(())
    }
}

/// Token budgets for the summarization pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Total input admitted into the pipeline
    pub document_tokens: usize,

    /// Size of one map call
    pub chunk_tokens: usize,

    /// Map calls in flight at once
    pub map_concurrency: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            document_tokens: 12_000,
            chunk_tokens: 2_000,
            map_concurrency: 1,
        }
    }
}

/// StudyMint application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM gateway settings
    pub llm: LlmSettings,

    /// Pipeline budgets
    pub budgets: BudgetConfig,

    /// Largest input file accepted
    pub max_upload_bytes: u64,

    /// Log directory
    pub log_dir: PathBuf,

    /// Log level
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            budgets: BudgetConfig::default(),
            max_upload_bytes: 5 * 1024 * 1024,
            log_dir: PathBuf::from("./log"),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self, StudyMintError> {
        // Load .env file (ignore if not exists)
        let _ = dotenv::dotenv();

        let config = Self::from_lookup(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Build configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|s| s.trim().parse::<usize>().ok());

        Self {
            llm: LlmSettings::from_lookup(&lookup),
            budgets: BudgetConfig {
                document_tokens: number("DOCUMENT_TOKEN_BUDGET")
                    .unwrap_or(defaults.budgets.document_tokens),
                chunk_tokens: number("CHUNK_TOKEN_BUDGET").unwrap_or(defaults.budgets.chunk_tokens),
                map_concurrency: number("MAP_CONCURRENCY")
                    .unwrap_or(defaults.budgets.map_concurrency),
            },
            max_upload_bytes: number("MAX_UPLOAD_BYTES")
                .map(|n| n as u64)
                .unwrap_or(defaults.max_upload_bytes),
            log_dir: lookup("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    /// Get log file path
    pub fn get_log_path(&self, filename: &str) -> PathBuf {
        self.log_dir.join(filename)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), StudyMintError> {
        self.llm.validate()?;

        if self.budgets.chunk_tokens == 0 {
            return Err(StudyMintError::config("Chunk token budget cannot be 0"));
        }

        if self.budgets.chunk_tokens > self.budgets.document_tokens {
            return Err(StudyMintError::config(format!(
                "Chunk token budget ({}) cannot exceed document token budget ({})",
                self.budgets.chunk_tokens, self.budgets.document_tokens
            )));
        }

        if self.budgets.map_concurrency == 0 {
            return Err(StudyMintError::config("Map concurrency cannot be 0"));
        }

        if self.max_upload_bytes == 0 {
            return Err(StudyMintError::config("Max upload size cannot be 0"));
        }

        Ok(())
    }
}
