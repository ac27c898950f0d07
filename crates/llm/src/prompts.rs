//! Prompt templates for study material generation

/// System instruction shared by the summarization calls
pub const SUMMARY_SYSTEM: &str = r#"You are an expert tutor who condenses course material into clear study notes.

Guidelines:
- Use bullet points.
- Stay faithful to the source. No speculation or opinion.
- Keep definitions, formulas, dates and names exactly as written."#;

/// Prompt for one chunk in the map phase
pub fn chunk_prompt(chunk: &str, index: usize, total: usize) -> String {
    format!(
        "The following is part {} of {} of a longer document. \
         Summarize its key points as study notes:\n---\n{}\n---",
        index + 1,
        total,
        chunk
    )
}

/// Prompt for the reduce phase (combining partial summaries)
pub fn reduce_prompt(summaries: &str) -> String {
    format!(
        "Below are partial study notes, in document order, written for consecutive parts \
         of one document. Merge them into a single coherent outline: remove duplicates, \
         reconcile overlaps and keep the original order of topics.\n---\n{}\n---",
        summaries
    )
}

/// Prompt for the structured analysis payload
pub fn analyze_prompt(text: &str) -> String {
    format!(
        "Analyze the following text and respond only in JSON with the keys:\n\
         {{\n\
         \x20 \"summary\": str,\n\
         \x20 \"concept_map\": [str, ...],\n\
         \x20 \"flashcards\": [{{\"term\": str, \"definition\": str}}],\n\
         \x20 \"quiz\": [{{\"question\": str, \"options\": [str, ...], \"answer\": str}}],\n\
         \x20 \"spaced_repetition\": [str, ...],\n\
         \x20 \"progress\": {{\"completion\": float, \"masteryLevel\": str}}\n\
         }}\n\
         Include key points in your analysis.\n\n{}",
        text
    )
}

/// Prompt for question/answer flashcards
pub fn flashcards_prompt(text: &str) -> String {
    format!(
        "Create flashcard question-answer pairs as JSON in the form \
         {{\"flashcards\": [{{\"question\": str, \"answer\": str}}]}} for the following text:\n\n{}",
        text
    )
}

/// Prompt for contextual practice exercises
pub fn exercises_prompt(text: &str) -> String {
    format!(
        "Generate contextual practice exercises as JSON in the form \
         {{\"contextualExercises\": [{{\"prompt\": str, \"answer\": str}}]}} for the following text:\n\n{}",
        text
    )
}

/// Prompt for evaluation questions
pub fn evaluation_prompt(text: &str) -> String {
    format!(
        "Generate quiz questions as JSON in the form \
         {{\"evaluationQuestions\": [{{\"question\": str, \"options\": [str, ...], \"answer\": str}}]}} \
         for the following text:\n\n{}",
        text
    )
}

/// Prompt for a Markdown course
pub fn course_prompt(text: &str) -> String {
    format!(
        "You are an AI that generates learning material. Given this text:\n{}\n\
         Create:\n\
         - A course outline (3 modules)\n\
         - 2 flashcards per module\n\
         - 2 multiple choice questions per module with answers and explanations\n\
         Format it in Markdown.",
        text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_prompt_numbers_parts_from_one() {
        let prompt = chunk_prompt("cells divide", 0, 3);
        assert!(prompt.contains("part 1 of 3"));
        assert!(prompt.contains("cells divide"));
    }

    #[test]
    fn test_analyze_prompt_lists_every_key() {
        let prompt = analyze_prompt("text");
        for key in ["summary", "concept_map", "flashcards", "quiz", "spaced_repetition", "progress"] {
            assert!(prompt.contains(&format!("\"{}\"", key)), "missing {}", key);
        }
        assert!(prompt.ends_with("text"));
    }
}
