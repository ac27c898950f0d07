//! StudyMint LLM Integration
//!
//! Provider gateway with retry and failover, token budgeting, map-reduce
//! summarization and study material generation

mod chunking;
mod coerce;
mod error;
mod gateway;
mod prompts;
mod providers;
mod retry;
mod study;
mod summarize;
mod tokens;
mod types;

#[cfg(test)]
mod test_support;

pub use chunking::{chunk_text, TextChunk};
pub use coerce::{coerce, FieldKind, FieldSpec, Schema};
pub use error::ProviderError;
pub use gateway::{
    provider_chain, AttemptOutcome, EnvSettings, Gateway, GatewayAttempt, ProviderSlot, SettingsSource,
};
pub use prompts::{chunk_prompt, reduce_prompt, SUMMARY_SYSTEM};
pub use providers::{
    AnthropicAdapter, CompletionBackend, Endpoint, HttpBackend, OllamaAdapter, OpenAiAdapter, ProviderAdapter,
    ProviderKind,
};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use study::{analysis_schema, CourseOutput, StudyMode, StudyOutput, StudyService};
pub use summarize::Summarizer;
pub use tokens::TokenEstimator;
pub use types::{CompletionRequest, DocumentSummary};
