//! Scripted collaborators for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use studymint_common::LlmSettings;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::providers::{CompletionBackend, ProviderKind};
use crate::retry::Sleeper;
use crate::types::CompletionRequest;

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync>;

/// Backend answering from per-provider scripts
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    scripts: Mutex<HashMap<ProviderKind, VecDeque<Result<String, ProviderError>>>>,
    responders: HashMap<ProviderKind, Responder>,
    calls: Mutex<Vec<ProviderKind>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Outcomes returned in order, then the responder (if any)
    pub(crate) fn script(self, kind: ProviderKind, outcomes: Vec<Result<&str, ProviderError>>) -> Self {
        let queue = outcomes
            .into_iter()
            .map(|outcome| outcome.map(str::to_string))
            .collect();
        self.scripts.lock().unwrap().insert(kind, queue);
        self
    }

    /// Same outcome for every call
    pub(crate) fn always(self, kind: ProviderKind, outcome: Result<&str, ProviderError>) -> Self {
        let outcome = outcome.map(str::to_string);
        self.respond_with(kind, move |_| outcome.clone())
    }

    /// Outcome computed from the request
    pub(crate) fn respond_with<F>(mut self, kind: ProviderKind, responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        self.responders.insert(kind, Box::new(responder));
        self
    }

    pub(crate) fn calls(&self) -> Vec<ProviderKind> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        kind: ProviderKind,
        _settings: &LlmSettings,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(kind);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(|queue| queue.pop_front());
        if let Some(outcome) = scripted {
            return outcome;
        }

        match self.responders.get(&kind) {
            Some(responder) => responder(request),
            None => Err(ProviderError::NotConfigured(format!("no script for {}", kind))),
        }
    }
}

/// Sleeper that records requested delays and returns at once
#[derive(Default)]
pub(crate) struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
    cancel_on_sleep: Option<CancellationToken>,
}

impl RecordingSleeper {
    /// Cancels `token` the first time a backoff starts
    pub(crate) fn cancelling(token: CancellationToken) -> Self {
        Self {
            sleeps: Mutex::new(Vec::new()),
            cancel_on_sleep: Some(token),
        }
    }

    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        if let Some(token) = &self.cancel_on_sleep {
            token.cancel();
        }
    }
}

/// Sleeper whose backoff never finishes on its own
#[derive(Default)]
pub(crate) struct StalledSleeper {
    started: tokio::sync::Notify,
}

impl StalledSleeper {
    /// Resolves once a backoff is in progress
    pub(crate) async fn backoff_started(&self) {
        self.started.notified().await;
    }
}

#[async_trait]
impl Sleeper for StalledSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.started.notify_one();
        std::future::pending::<()>().await;
    }
}
