//! Study material generation on top of the gateway and summarizer

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use studymint_common::{Result, StudyMintError};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::coerce::{coerce, FieldSpec, Schema};
use crate::prompts::{analyze_prompt, course_prompt, evaluation_prompt, exercises_prompt, flashcards_prompt};
use crate::summarize::Summarizer;
use crate::types::CompletionRequest;

const STUDY_TEMPERATURE: f32 = 0.2;

/// Kind of study material to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyMode {
    Memorization,
    ContextualAssociation,
    InteractiveEvaluation,
    DeepUnderstanding,
}

impl StudyMode {
    pub const ALL: [StudyMode; 4] = [
        StudyMode::Memorization,
        StudyMode::ContextualAssociation,
        StudyMode::InteractiveEvaluation,
        StudyMode::DeepUnderstanding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StudyMode::Memorization => "memorization",
            StudyMode::ContextualAssociation => "contextual_association",
            StudyMode::InteractiveEvaluation => "interactive_evaluation",
            StudyMode::DeepUnderstanding => "deep_understanding",
        }
    }

    /// Prompt builder and output schema, or `None` for modes served elsewhere
    fn material(&self) -> Option<(fn(&str) -> String, Schema)> {
        let (prompt, key, fallback_key, alias): (fn(&str) -> String, _, _, _) = match self {
            StudyMode::Memorization => (flashcards_prompt, "flashcards", "question", "cards"),
            StudyMode::ContextualAssociation => (exercises_prompt, "contextualExercises", "prompt", "exercises"),
            StudyMode::InteractiveEvaluation => (evaluation_prompt, "evaluationQuestions", "question", "exercises"),
            StudyMode::DeepUnderstanding => return None,
        };
        let schema = Schema::new(key, vec![FieldSpec::records(key, fallback_key).alias(alias)]);
        Some((prompt, schema))
    }
}

impl fmt::Display for StudyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudyMode {
    type Err = StudyMintError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        StudyMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| StudyMintError::invalid_input(format!("Unknown study mode: {}", s)))
    }
}

/// Schema of the `analyze` payload
pub fn analysis_schema() -> Schema {
    Schema::new(
        "summary",
        vec![
            FieldSpec::text("summary"),
            FieldSpec::list("concept_map").alias("conceptMap"),
            FieldSpec::records("flashcards", "term"),
            FieldSpec::records("quiz", "question").alias("quizQuestions"),
            FieldSpec::list("spaced_repetition").alias("spacedRepetition"),
            FieldSpec::object("progress", json!({"completion": 0.0, "masteryLevel": ""})),
        ],
    )
}

/// Structured study payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyOutput {
    /// Input was cut to the document budget before the call
    pub truncated: bool,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Markdown course
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseOutput {
    pub markdown: String,
    /// Input was summarized before the course prompt
    pub condensed: bool,
    pub truncated: bool,
}

/// Generates study material from plain text
pub struct StudyService {
    summarizer: Arc<Summarizer>,
}

impl StudyService {
    pub fn new(summarizer: Arc<Summarizer>) -> Self {
        Self { summarizer }
    }

    /// Summary, concept map, flashcards, quiz, review list and progress in one call
    pub async fn analyze(&self, text: &str, cancel: &CancellationToken) -> Result<StudyOutput> {
        let (text, truncated) = self.fit_document(text)?;
        info!("Generating analysis ({} chars)", text.len());

        let raw = self.ask(analyze_prompt(&text), cancel).await?;
        Ok(StudyOutput {
            truncated,
            payload: coerce(&raw, &analysis_schema()),
        })
    }

    /// Mode-specific study material
    pub async fn study(&self, text: &str, mode: StudyMode, cancel: &CancellationToken) -> Result<StudyOutput> {
        let Some((prompt, schema)) = mode.material() else {
            return Err(StudyMintError::invalid_input(format!(
                "Study mode '{}' needs the concept map service and is not available here",
                mode
            )));
        };
        let (text, truncated) = self.fit_document(text)?;
        info!("Generating {} material ({} chars)", mode, text.len());

        let raw = self.ask(prompt(&text), cancel).await?;
        Ok(StudyOutput {
            truncated,
            payload: coerce(&raw, &schema),
        })
    }

    /// Markdown course outline with flashcards and questions per module
    ///
    /// Text longer than one chunk goes through the summarizer first.
    pub async fn course(&self, text: &str, cancel: &CancellationToken) -> Result<CourseOutput> {
        if text.trim().is_empty() {
            return Err(StudyMintError::invalid_input("Document text is empty"));
        }

        let budgets = self.summarizer.budgets();
        let estimator = self.summarizer.estimator();
        let (source, condensed, truncated) = if estimator.estimate(text) > budgets.chunk_tokens {
            info!("Condensing text before course generation");
            let summary = self
                .summarizer
                .summarize_with_estimator(&estimator, text, budgets.document_tokens, budgets.chunk_tokens, cancel)
                .await?;
            (summary.text, true, summary.truncated)
        } else {
            (text.to_string(), false, false)
        };

        let markdown = self.ask(course_prompt(&source), cancel).await?;
        Ok(CourseOutput {
            markdown,
            condensed,
            truncated,
        })
    }

    fn fit_document(&self, text: &str) -> Result<(String, bool)> {
        if text.trim().is_empty() {
            return Err(StudyMintError::invalid_input("Document text is empty"));
        }
        let budget = self.summarizer.budgets().document_tokens;
        let estimator = self.summarizer.estimator();
        let truncated = estimator.estimate(text) > budget;
        Ok((estimator.truncate(text, budget).into_owned(), truncated))
    }

    async fn ask(&self, prompt: String, cancel: &CancellationToken) -> Result<String> {
        let request = CompletionRequest::new(prompt).with_temperature(STUDY_TEMPERATURE);
        self.summarizer.gateway().ask_with(&request, cancel).await
    }
}
