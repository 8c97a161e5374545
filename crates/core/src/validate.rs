//! Answer normalization and correctness rules, one arm per question type.
//!
//! Both functions are pure; normalization rejects malformed input without
//! touching any state, and the same correctness rules back the live submit
//! path and any later recomputation from stored answers.

use thiserror::Error;

use crate::model::{Question, QuestionKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("answer does not match any choice: {provided}")]
    UnknownChoice { provided: String },

    #[error("malformed numeric answer: {provided}")]
    MalformedNumber { provided: String },
}

/// Normalize a raw answer into its canonical stored form.
///
/// - choice questions store the selected choice text, which must match one of
///   the question's choices;
/// - text questions store the raw string as-is (trimming happens at grading);
/// - numeric questions accept only digits, at most one leading `-` and at most
///   one `.`, and store the shortest round-trip rendering of the parsed value.
///
/// # Errors
///
/// Returns `ValidationError::UnknownChoice` for a choice text not present on
/// the question, and `ValidationError::MalformedNumber` for numeric input
/// that violates the character rules or does not parse.
pub fn normalize(question: &Question, raw: &str) -> Result<String, ValidationError> {
    match question.kind() {
        QuestionKind::MultipleChoice { choices } | QuestionKind::Boolean { choices } => choices
            .iter()
            .find(|c| c.text() == raw)
            .map(|c| c.text().to_owned())
            .ok_or_else(|| ValidationError::UnknownChoice {
                provided: raw.to_owned(),
            }),
        QuestionKind::Text { .. } => Ok(raw.to_owned()),
        QuestionKind::Number { .. } => parse_decimal(raw).map(|v| v.to_string()),
    }
}

/// Whether a stored (normalized) answer is correct for the question.
#[must_use]
pub fn is_correct(question: &Question, stored: &str) -> bool {
    match question.kind() {
        QuestionKind::MultipleChoice { choices } | QuestionKind::Boolean { choices } => choices
            .iter()
            .any(|c| c.is_correct() && c.text() == stored),
        QuestionKind::Text {
            correct_answer,
            case_sensitive,
        } => {
            // Both sides are trimmed regardless of case sensitivity.
            let given = stored.trim();
            let expected = correct_answer.trim();
            if *case_sensitive {
                given == expected
            } else {
                given.to_lowercase() == expected.to_lowercase()
            }
        }
        QuestionKind::Number {
            correct_answer,
            tolerance,
        } => {
            let Ok(value) = stored.parse::<f64>() else {
                return false;
            };
            if *correct_answer == 0.0 {
                // Relative tolerance degenerates at zero; fall back to absolute.
                value.abs() <= *tolerance
            } else {
                (value - correct_answer).abs() <= tolerance * correct_answer.abs()
            }
        }
    }
}

fn parse_decimal(raw: &str) -> Result<f64, ValidationError> {
    let malformed = || ValidationError::MalformedNumber {
        provided: raw.to_owned(),
    };

    let mut digits = 0usize;
    let mut dots = 0usize;
    for (i, ch) in raw.char_indices() {
        match ch {
            '0'..='9' => digits += 1,
            '-' if i == 0 => {}
            '.' if dots == 0 => dots += 1,
            _ => return Err(malformed()),
        }
    }
    if digits == 0 {
        return Err(malformed());
    }

    raw.parse::<f64>().map_err(|_| malformed())
}
