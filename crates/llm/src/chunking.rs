use studymint_common::{Result, StudyMintError};

use crate::tokens::TokenEstimator;

/// Text chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position in the chunk sequence
    pub index: usize,

    /// Chunk text
    pub text: String,

    /// Estimated token count
    pub tokens: usize,
}

/// Split text into chunks that each fit `max_tokens`
///
/// Text that already fits comes back as one chunk, unchanged. Otherwise words
/// are packed greedily and joined with single spaces, so joining the chunks
/// with spaces gives back the original word sequence.
///
/// Fails with `InvalidBudget` when a single word alone exceeds the budget.
pub fn chunk_text(estimator: &TokenEstimator, text: &str, max_tokens: usize) -> Result<Vec<TextChunk>> {
    let total = estimator.estimate(text);
    if total <= max_tokens {
        return Ok(vec![TextChunk {
            index: 0,
            text: text.to_string(),
            tokens: total,
        }]);
    }

    let capacity = estimator.capacity(max_tokens);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut used = 0;

    for word in text.split_whitespace() {
        let word_tokens = estimator.estimate(word);
        if word_tokens > max_tokens {
            return Err(StudyMintError::invalid_budget(word_tokens, max_tokens));
        }

        let mut cost = if current.is_empty() {
            estimator.weight(word)
        } else {
            estimator.weight(&format!(" {}", word))
        };

        if !current.is_empty() && used + cost > capacity {
            close_chunk(&mut chunks, std::mem::take(&mut current), estimator);
            used = 0;
            cost = estimator.weight(word);
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        used += cost;
    }

    if !current.is_empty() {
        close_chunk(&mut chunks, current, estimator);
    }

    Ok(chunks)
}

fn close_chunk(chunks: &mut Vec<TextChunk>, text: String, estimator: &TokenEstimator) {
    let tokens = estimator.estimate(&text);
    chunks.push(TextChunk {
        index: chunks.len(),
        text,
        tokens,
    });
}
