use std::sync::{Arc, Mutex};

use futures::{StreamExt, TryStreamExt};
use studymint_common::{BudgetConfig, Result, StudyMintError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunking::{chunk_text, TextChunk};
use crate::gateway::Gateway;
use crate::prompts::{chunk_prompt, reduce_prompt, SUMMARY_SYSTEM};
use crate::providers::ProviderKind;
use crate::tokens::TokenEstimator;
use crate::types::{CompletionRequest, DocumentSummary};

const SUMMARY_TEMPERATURE: f32 = 0.3;

/// Summarizer for long text using map-reduce
pub struct Summarizer {
    gateway: Arc<Gateway>,
    budgets: BudgetConfig,
    // last estimator built, keyed by model name
    estimator_cache: Mutex<Option<(Option<String>, Arc<TokenEstimator>)>>,
}

impl Summarizer {
    /// Create new summarizer
    pub fn new(gateway: Arc<Gateway>, budgets: BudgetConfig) -> Self {
        Self {
            gateway,
            budgets,
            estimator_cache: Mutex::new(None),
        }
    }

    /// Gateway used for every call
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Configured budgets
    pub fn budgets(&self) -> BudgetConfig {
        self.budgets
    }

    /// Estimator for the model the primary provider is configured with
    ///
    /// The model is looked up per request so a change applies on the next
    /// call; the tokenizer table is only rebuilt when the model changes.
    pub fn estimator(&self) -> Arc<TokenEstimator> {
        let model = match self.gateway.settings() {
            Ok(settings) => settings
                .provider
                .parse::<ProviderKind>()
                .ok()
                .map(|kind| kind.settings(&settings).model.clone()),
            Err(e) => {
                warn!("Could not load LLM settings for token estimation: {}", e);
                return Arc::new(TokenEstimator::heuristic());
            }
        };

        let mut cache = self
            .estimator_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((cached_model, estimator)) = cache.as_ref() {
            if *cached_model == model {
                return Arc::clone(estimator);
            }
        }

        let estimator = Arc::new(TokenEstimator::for_model(model.as_deref()));
        *cache = Some((model, Arc::clone(&estimator)));
        estimator
    }

    /// Summarize with the configured budgets
    pub async fn summarize(&self, text: &str) -> Result<DocumentSummary> {
        self.summarize_document(text, self.budgets.document_tokens, self.budgets.chunk_tokens)
            .await
    }

    /// Summarize an arbitrarily long document
    pub async fn summarize_document(
        &self,
        raw_text: &str,
        document_budget: usize,
        chunk_budget: usize,
    ) -> Result<DocumentSummary> {
        self.summarize_document_with(raw_text, document_budget, chunk_budget, &CancellationToken::new())
            .await
    }

    /// Summarize with cancellation
    ///
    /// Budget and input checks run before any provider call. A failure of any
    /// map call fails the whole document.
    pub async fn summarize_document_with(
        &self,
        raw_text: &str,
        document_budget: usize,
        chunk_budget: usize,
        cancel: &CancellationToken,
    ) -> Result<DocumentSummary> {
        let estimator = self.estimator();
        self.summarize_with_estimator(&estimator, raw_text, document_budget, chunk_budget, cancel)
            .await
    }

    /// Same as `summarize_document_with`, counting with an estimator the caller
    /// already resolved
    pub(crate) async fn summarize_with_estimator(
        &self,
        estimator: &TokenEstimator,
        raw_text: &str,
        document_budget: usize,
        chunk_budget: usize,
        cancel: &CancellationToken,
    ) -> Result<DocumentSummary> {
        if raw_text.trim().is_empty() {
            return Err(StudyMintError::invalid_input("Document text is empty"));
        }
        if chunk_budget == 0 || chunk_budget > document_budget {
            // chunk budget must be positive and fit inside the document budget
            return Err(StudyMintError::invalid_budget(chunk_budget.max(1), document_budget));
        }

        let total_tokens = estimator.estimate(raw_text);
        info!(
            "Starting summarization - Text length: {} chars, ~{} tokens",
            raw_text.len(),
            total_tokens
        );

        let truncated = total_tokens > document_budget;
        let text = estimator.truncate(raw_text, document_budget);
        if truncated {
            warn!(
                "Document exceeds budget ({} > {} tokens), truncated to {} chars",
                total_tokens,
                document_budget,
                text.len()
            );
        }

        let chunks = chunk_text(estimator, &text, chunk_budget)?;
        info!("Split text into {} chunks", chunks.len());

        // Map
        let partials = self.map_chunks(&chunks, cancel).await?;

        // Reduce
        let combined = partials.join("\n");
        info!("Combined chunk summaries - Length: {} chars", combined.len());
        let request = summary_request(reduce_prompt(&combined));
        let summary = self.gateway.ask_with(&request, cancel).await?;

        Ok(DocumentSummary {
            text: summary,
            truncated,
            chunk_count: chunks.len(),
        })
    }

    /// Summarize each chunk, returning partials in chunk order
    async fn map_chunks(&self, chunks: &[TextChunk], cancel: &CancellationToken) -> Result<Vec<String>> {
        let total = chunks.len();
        let concurrency = self.budgets.map_concurrency.max(1);

        futures::stream::iter(chunks.iter().map(|chunk| async move {
            debug!("Summarizing chunk {}/{} (~{} tokens)", chunk.index + 1, total, chunk.tokens);
            let request = summary_request(chunk_prompt(&chunk.text, chunk.index, total));
            self.gateway.ask_with(&request, cancel).await
        }))
        .buffered(concurrency)
        .try_collect()
        .await
    }
}

fn summary_request(prompt: String) -> CompletionRequest {
    CompletionRequest::new(prompt)
        .with_system(SUMMARY_SYSTEM)
        .with_temperature(SUMMARY_TEMPERATURE)
}
