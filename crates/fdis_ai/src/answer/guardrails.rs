use fdis_core::evidence::citations::strip_inline_citations;

use super::prompts::{ANSWER_CLOSE_TAG, ANSWER_OPEN_TAG};

/// Text between the first `<ANSWER>` and the `</ANSWER>` after it, trimmed.
pub fn extract_tagged_answer(raw: &str) -> Option<&str> {
    let start = raw.find(ANSWER_OPEN_TAG)? + ANSWER_OPEN_TAG.len();
    let end = raw[start..].find(ANSWER_CLOSE_TAG)?;
    Some(raw[start..start + end].trim())
}

/// Tagged answer with inline citation artifacts removed; `None` when nothing usable remains.
pub fn clean_answer(raw: &str, min_chars: usize) -> Option<String> {
    let tagged = extract_tagged_answer(raw)?;
    let cleaned = strip_inline_citations(tagged);
    if cleaned.is_empty() || cleaned.chars().count() < min_chars {
        return None;
    }
    Some(cleaned)
}
