//! Token estimation and budget truncation

use std::borrow::Cow;
use std::fmt;

use tiktoken_rs::CoreBPE;
use tracing::debug;

/// Heuristic ratio used when no tokenizer table exists for the model
pub const CHARS_PER_TOKEN: usize = 4;

/// Token counter for one model identity
///
/// Built from the configured model and reused until it changes. Models with a known BPE
/// table get exact counts; everything else falls back to a character ratio.
pub enum TokenEstimator {
    /// Exact BPE tokenizer
    Tiktoken(CoreBPE),
    /// `ceil(chars / CHARS_PER_TOKEN)`
    Heuristic,
}

impl fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tiktoken(_) => f.write_str("TokenEstimator::Tiktoken"),
            Self::Heuristic => f.write_str("TokenEstimator::Heuristic"),
        }
    }
}

impl TokenEstimator {
    /// Resolve the estimator for a model name
    pub fn for_model(model: Option<&str>) -> Self {
        let Some(model) = model else {
            return Self::Heuristic;
        };

        match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => {
                debug!("Using BPE tokenizer for model {}", model);
                Self::Tiktoken(bpe)
            }
            Err(_) => {
                debug!("No tokenizer table for model {}, using heuristic estimate", model);
                Self::Heuristic
            }
        }
    }

    /// Heuristic estimator
    pub fn heuristic() -> Self {
        Self::Heuristic
    }

    /// Whether counts are exact
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Tiktoken(_))
    }

    /// Estimated token count; 0 only for the empty string
    pub fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        match self {
            Self::Tiktoken(bpe) => bpe.encode_ordinary(text).len().max(1),
            Self::Heuristic => text.chars().count().div_ceil(CHARS_PER_TOKEN),
        }
    }

    /// Additive weight of a text piece
    ///
    /// Weights of consecutive pieces sum to the weight of their concatenation,
    /// and `estimate(s) <= n` exactly when `weight(s) <= capacity(n)`.
    pub fn weight(&self, piece: &str) -> usize {
        match self {
            Self::Tiktoken(bpe) => bpe.encode_ordinary(piece).len(),
            Self::Heuristic => piece.chars().count(),
        }
    }

    /// Weight available under a token budget
    pub fn capacity(&self, max_tokens: usize) -> usize {
        match self {
            Self::Tiktoken(_) => max_tokens,
            Self::Heuristic => max_tokens.saturating_mul(CHARS_PER_TOKEN),
        }
    }

    /// Cut text down to a token budget
    ///
    /// Returns the input untouched when it already fits. The BPE path cuts on
    /// token boundaries; the heuristic path keeps the longest prefix ending on
    /// a word boundary, with the original spacing.
    pub fn truncate<'a>(&self, text: &'a str, max_tokens: usize) -> Cow<'a, str> {
        if self.estimate(text) <= max_tokens {
            return Cow::Borrowed(text);
        }

        let truncated = match self {
            Self::Tiktoken(bpe) => self.truncate_tokens(bpe, text, max_tokens),
            Self::Heuristic => self.truncate_words(text, max_tokens),
        };

        debug!(
            "Truncated text from {} to {} chars (budget {} tokens)",
            text.len(),
            truncated.len(),
            max_tokens
        );

        Cow::Owned(truncated)
    }

    fn truncate_tokens(&self, bpe: &CoreBPE, text: &str, max_tokens: usize) -> String {
        let tokens = bpe.encode_ordinary(text);
        let mut keep = max_tokens.min(tokens.len());

        // A slice can end inside a multi-byte character; back off until it decodes
        while keep > 0 {
            if let Ok(decoded) = bpe.decode(tokens[..keep].to_vec()) {
                if self.estimate(&decoded) <= max_tokens {
                    return decoded;
                }
            }
            keep -= 1;
        }

        String::new()
    }

    fn truncate_words(&self, text: &str, max_tokens: usize) -> String {
        let capacity = self.capacity(max_tokens);
        let mut end = 0;
        let mut used = 0;

        for (_, word_end) in word_spans(text) {
            let cost = self.weight(&text[end..word_end]);
            if used + cost > capacity {
                break;
            }
            used += cost;
            end = word_end;
        }

        text[..end].to_string()
    }
}

/// Byte spans of whitespace-delimited words
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }

    if let Some(s) = start {
        spans.push((s, text.len()));
    }

    spans
}
