//! LLM Gateway - one `ask` operation over every configured provider
//!
//! Settings are loaded on every call. The primary provider gets the full retry
//! budget before the fallback is tried; non-transient failures skip straight
//! to the next provider.

use std::fmt;
use std::sync::Arc;

use studymint_common::{LlmSettings, Result, StudyMintError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::providers::{CompletionBackend, HttpBackend, ProviderKind};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::types::CompletionRequest;

/// Source of gateway settings, consulted on every call
pub trait SettingsSource: Send + Sync {
    fn load(&self) -> Result<LlmSettings>;
}

/// Reads the process environment each time
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSettings;

impl SettingsSource for EnvSettings {
    fn load(&self) -> Result<LlmSettings> {
        let settings = LlmSettings::from_env();
        settings.validate()?;
        Ok(settings)
    }
}

impl SettingsSource for LlmSettings {
    fn load(&self) -> Result<LlmSettings> {
        Ok(self.clone())
    }
}

/// One entry of the provider chain
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSlot {
    /// Name as configured
    pub name: String,
    /// Parsed kind, or the failure to parse it
    pub kind: std::result::Result<ProviderKind, ProviderError>,
}

impl ProviderSlot {
    fn parse(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            kind: name.parse(),
        }
    }

    fn same_provider(&self, other: &ProviderSlot) -> bool {
        match (&self.kind, &other.kind) {
            (Ok(a), Ok(b)) => a == b,
            _ => self.name.eq_ignore_ascii_case(&other.name),
        }
    }
}

/// Ordered providers for one call: primary, then a distinct fallback
pub fn provider_chain(settings: &LlmSettings) -> Vec<ProviderSlot> {
    let primary = ProviderSlot::parse(&settings.provider);
    let mut chain = vec![primary];

    if let Some(fallback) = settings.fallback_provider.as_deref() {
        let fallback = ProviderSlot::parse(fallback);
        if !fallback.name.is_empty() && !fallback.same_provider(&chain[0]) {
            chain.push(fallback);
        }
    }

    chain
}

/// How one attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Transient,
    NonTransient,
}

/// One provider attempt, kept for logging only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayAttempt {
    pub provider: String,
    /// 1-based attempt number on this provider
    pub attempt: u32,
    pub outcome: AttemptOutcome,
}

impl fmt::Display for GatewayAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} attempt {}: {:?}", self.provider, self.attempt, self.outcome)
    }
}

/// Gateway over the configured providers
pub struct Gateway {
    settings: Arc<dyn SettingsSource>,
    backend: Arc<dyn CompletionBackend>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl Gateway {
    /// Create a gateway over an explicit settings source and backend
    pub fn new(settings: Arc<dyn SettingsSource>, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            settings,
            backend,
            sleeper: Arc::new(TokioSleeper),
            policy: RetryPolicy::default(),
        }
    }

    /// Gateway reading the environment and calling providers over HTTP
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Arc::new(EnvSettings), Arc::new(HttpBackend::new()?)))
    }

    /// Set retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the backoff sleeper
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Current settings, freshly loaded
    pub fn settings(&self) -> Result<LlmSettings> {
        self.settings.load()
    }

    /// Ask with a plain prompt and no cancellation
    pub async fn ask(&self, prompt: &str) -> Result<String> {
        self.ask_with(&CompletionRequest::new(prompt), &CancellationToken::new())
            .await
    }

    /// Ask with retry and failover
    ///
    /// Cancelling `cancel` aborts the in-flight attempt or pending backoff and
    /// returns `Cancelled`.
    pub async fn ask_with(&self, request: &CompletionRequest, cancel: &CancellationToken) -> Result<String> {
        let settings = self.settings.load()?;
        let chain = provider_chain(&settings);
        let mut last_error: Option<String> = None;

        for (index, slot) in chain.iter().enumerate() {
            if index > 0 {
                info!("Failing over to provider '{}'", slot.name);
            }

            let kind = match &slot.kind {
                Ok(kind) => *kind,
                Err(e) => {
                    warn!("Skipping provider '{}': {}", slot.name, e);
                    last_error = Some(format!("{}: {}", slot.name, e));
                    continue;
                }
            };

            let mut attempt = 0;
            loop {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(StudyMintError::Cancelled),
                    result = self.backend.complete(kind, &settings, request) => result,
                };

                let error = match result {
                    Ok(text) => {
                        record(&GatewayAttempt {
                            provider: kind.to_string(),
                            attempt: attempt + 1,
                            outcome: AttemptOutcome::Success,
                        });
                        return Ok(text);
                    }
                    Err(e) => e,
                };

                let transient = error.is_transient();
                record(&GatewayAttempt {
                    provider: kind.to_string(),
                    attempt: attempt + 1,
                    outcome: if transient {
                        AttemptOutcome::Transient
                    } else {
                        AttemptOutcome::NonTransient
                    },
                });
                last_error = Some(format!("{}: {}", kind, error));

                if !transient {
                    warn!("Provider '{}' failed permanently: {}", kind, error);
                    break;
                }

                if !self.policy.has_next_attempt(attempt) {
                    warn!(
                        "Provider '{}' exhausted {} attempts: {}",
                        kind, self.policy.max_attempts, error
                    );
                    break;
                }

                let delay = self.policy.delay_for_attempt(attempt);
                warn!(
                    "Provider '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                    kind,
                    attempt + 1,
                    self.policy.max_attempts,
                    error,
                    delay
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(StudyMintError::Cancelled),
                    _ = self.sleeper.sleep(delay) => {}
                }
                attempt += 1;
            }
        }

        Err(StudyMintError::provider_unavailable(
            last_error.unwrap_or_else(|| "no provider configured".to_string()),
        ))
    }
}

fn record(attempt: &GatewayAttempt) {
    debug!("{}", attempt);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingSleeper, ScriptedBackend, StalledSleeper};
    use std::time::Duration;

    fn settings(primary: &str, fallback: Option<&str>) -> LlmSettings {
        LlmSettings {
            provider: primary.to_string(),
            fallback_provider: fallback.map(str::to_string),
            ..Default::default()
        }
    }

    fn gateway(settings: LlmSettings, backend: Arc<ScriptedBackend>, sleeper: Arc<dyn Sleeper>) -> Gateway {
        Gateway::new(Arc::new(settings), backend).with_sleeper(sleeper)
    }

    fn rate_limited() -> ProviderError {
        ProviderError::RateLimited("slow down".to_string())
    }

    #[test]
    fn test_provider_chain_skips_duplicate_fallback() {
        assert_eq!(provider_chain(&settings("anthropic", Some("Claude"))).len(), 1);
        assert_eq!(provider_chain(&settings("anthropic", Some("  "))).len(), 1);

        let chain = provider_chain(&settings("openai", Some("ollama")));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].kind, Ok(ProviderKind::Ollama));

        let chain = provider_chain(&settings("mystery", Some("local")));
        assert!(chain[0].kind.is_err());
        assert_eq!(chain[1].kind, Ok(ProviderKind::Local));
    }

    #[tokio::test]
    async fn test_transient_failures_then_success_stays_on_primary() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .script(ProviderKind::Anthropic, vec![Err(rate_limited()), Err(rate_limited()), Ok("answer")])
                .script(ProviderKind::OpenAi, vec![Ok("fallback")]),
        );
        let sleeper = Arc::new(RecordingSleeper::default());
        let gateway = gateway(settings("anthropic", Some("openai")), backend.clone(), sleeper.clone());

        assert_eq!(gateway.ask("question").await.unwrap(), "answer");
        assert_eq!(backend.calls(), vec![ProviderKind::Anthropic; 3]);

        let sleeps = sleeper.sleeps();
        assert_eq!(sleeps.len(), 2);
        assert!(sleeps[0] >= Duration::from_millis(500));
        assert!(sleeps[1] >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_non_transient_failure_fails_over_immediately() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .always(ProviderKind::Anthropic, Err(ProviderError::Authentication("bad key".into())))
                .script(ProviderKind::Ollama, vec![Ok("from ollama")]),
        );
        let sleeper = Arc::new(RecordingSleeper::default());
        let gateway = gateway(settings("anthropic", Some("ollama")), backend.clone(), sleeper.clone());

        assert_eq!(gateway.ask("question").await.unwrap(), "from ollama");
        assert_eq!(backend.calls(), vec![ProviderKind::Anthropic, ProviderKind::Ollama]);
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_all_providers_exhausted() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .always(ProviderKind::OpenAi, Err(ProviderError::ServerError("HTTP 503".into())))
                .always(ProviderKind::Local, Err(ProviderError::Network("connection refused".into()))),
        );
        let sleeper = Arc::new(RecordingSleeper::default());
        let gateway = gateway(settings("openai", Some("local")), backend.clone(), sleeper.clone());

        let err = gateway.ask("question").await.unwrap_err();
        match err {
            StudyMintError::ProviderUnavailable { last_error } => {
                assert!(last_error.contains("connection refused"), "{}", last_error);
            }
            other => panic!("unexpected error: {other}"),
        }

        // 5 attempts each, 4 backoffs each
        assert_eq!(backend.calls().len(), 10);
        assert_eq!(sleeper.sleeps().len(), 8);
    }

    #[tokio::test]
    async fn test_unknown_primary_uses_fallback() {
        let backend = Arc::new(ScriptedBackend::new().script(ProviderKind::Local, vec![Ok("local answer")]));
        let gateway = gateway(
            settings("gpt-local", Some("local")),
            backend.clone(),
            Arc::new(RecordingSleeper::default()),
        );

        assert_eq!(gateway.ask("question").await.unwrap(), "local answer");
        assert_eq!(backend.calls(), vec![ProviderKind::Local]);
    }

    #[tokio::test]
    async fn test_unknown_provider_without_fallback_is_unavailable() {
        let backend = Arc::new(ScriptedBackend::new());
        let gateway = gateway(settings("bard", None), backend.clone(), Arc::new(RecordingSleeper::default()));

        let err = gateway.ask("question").await.unwrap_err();
        assert!(matches!(err, StudyMintError::ProviderUnavailable { .. }));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_custom_policy_limits_attempts() {
        let backend = Arc::new(ScriptedBackend::new().always(ProviderKind::Anthropic, Err(rate_limited())));
        let gateway = gateway(settings("anthropic", None), backend.clone(), Arc::new(RecordingSleeper::default()))
            .with_retry_policy(RetryPolicy::no_retry());

        assert!(gateway.ask("question").await.is_err());
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_signalled_from_backoff_stops_retries() {
        let backend = Arc::new(ScriptedBackend::new().always(ProviderKind::Anthropic, Err(rate_limited())));
        let cancel = CancellationToken::new();
        let sleeper = Arc::new(RecordingSleeper::cancelling(cancel.clone()));
        let gateway = gateway(settings("anthropic", Some("openai")), backend.clone(), sleeper);

        let err = gateway
            .ask_with(&CompletionRequest::new("question"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, StudyMintError::Cancelled));
        assert_eq!(backend.calls(), vec![ProviderKind::Anthropic]);
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_backoff() {
        let backend = Arc::new(ScriptedBackend::new().always(ProviderKind::Anthropic, Err(rate_limited())));
        let sleeper = Arc::new(StalledSleeper::default());
        let gateway = gateway(settings("anthropic", Some("openai")), backend.clone(), sleeper.clone());
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                sleeper.backoff_started().await;
                cancel.cancel();
            })
        };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            gateway.ask_with(&CompletionRequest::new("question"), &cancel),
        )
        .await
        .expect("backoff was not interrupted");

        assert!(matches!(result, Err(StudyMintError::Cancelled)));
        assert_eq!(backend.calls(), vec![ProviderKind::Anthropic]);
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_attempt() {
        let backend = Arc::new(ScriptedBackend::new().always(ProviderKind::Anthropic, Ok("never")));
        let gateway = gateway(settings("anthropic", None), backend.clone(), Arc::new(RecordingSleeper::default()));

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = gateway
            .ask_with(&CompletionRequest::new("question"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, StudyMintError::Cancelled));
        assert!(backend.calls().is_empty());
    }
}
