use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RagError, Result};

pub const OPTION_COUNT: usize = 4;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QuizItem {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: u8,
    pub explanation: String,
}

/// Turn raw model output into at most `count` valid items, or the fallback
/// set when nothing usable came back.
pub fn from_response(raw: &str, count: usize) -> Vec<QuizItem> {
    let Some(candidates) = first_json_array(raw) else {
        tracing::warn!("No JSON array in quiz response, using fallback");
        return fallback(count);
    };

    let total = candidates.len();
    let mut items: Vec<QuizItem> = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, value)| match validate_item(value) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::debug!("Dropping quiz item {}: {}", i, e);
                None
            }
        })
        .collect();

    if items.is_empty() {
        tracing::warn!("None of {} quiz items were valid, using fallback", total);
        return fallback(count);
    }

    items.truncate(count);
    tracing::info!("Generated {} valid quiz items ({} parsed)", items.len(), total);
    items
}

/// First balanced `[...]` span in `text` that parses as a JSON array.
///
/// Brackets inside JSON strings are skipped, so prose before or after the
/// array (or `]` inside a question) does not cut it short.
pub fn first_json_array(text: &str) -> Option<Vec<Value>> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('[') {
        let start = search_from + offset;
        if let Some(end) = matching_bracket(text, start) {
            if let Ok(Value::Array(values)) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Some(values);
            }
        }
        search_from = start + 1;
    }
    None
}

/// Byte index of the `]` closing the `[` at `start`.
fn matching_bracket(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn validate_item(value: &Value) -> Result<QuizItem> {
    let obj = value
        .as_object()
        .ok_or_else(|| RagError::Validation("item is not an object".into()))?;

    let text_field = |key: &str| -> Result<String> {
        obj.get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RagError::Validation(format!("missing or empty '{key}'")))
    };
    let question = text_field("question")?;
    let explanation = text_field("explanation")?;

    let options = obj
        .get("options")
        .and_then(Value::as_array)
        .ok_or_else(|| RagError::Validation("missing 'options'".into()))?;
    if options.len() != OPTION_COUNT {
        return Err(RagError::Validation(format!(
            "expected {OPTION_COUNT} options, got {}",
            options.len()
        )));
    }
    let options = options
        .iter()
        .map(|o| o.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| RagError::Validation("options must be strings".into()))?;

    let correct_answer = obj
        .get("correct_answer")
        .and_then(Value::as_u64)
        .filter(|&n| n < OPTION_COUNT as u64)
        .ok_or_else(|| {
            RagError::Validation("'correct_answer' must be an integer in 0..=3".into())
        })?;

    Ok(QuizItem {
        question,
        options,
        correct_answer: correct_answer as u8,
        explanation,
    })
}

/// Exactly `count` placeholder items that say generation failed.
pub fn fallback(count: usize) -> Vec<QuizItem> {
    tracing::warn!("Generating {} fallback quiz items", count);
    (1..=count)
        .map(|k| QuizItem {
            question: format!("Quiz generation failed (question {k}). Please try again."),
            options: vec![
                "Try again".to_string(),
                "Choose a different note".to_string(),
                "Request fewer questions".to_string(),
                "Try again in a moment".to_string(),
            ],
            correct_answer: 0,
            explanation: "The model's answer could not be turned into a quiz. Please try again."
                .to_string(),
        })
        .collect()
}
