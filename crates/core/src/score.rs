//! Deterministic score aggregation over a quiz's questions.

use std::collections::BTreeMap;

use crate::model::{Answer, QuestionId, Quiz};
use crate::validate;

/// Grading outcome for a single question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionResult {
    pub question_id: QuestionId,
    pub correct: bool,
    pub points_awarded: u32,
}

/// Full grading report for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreReport {
    pub total: u32,
    pub per_question: Vec<QuestionResult>,
}

/// Grade a set of stored answers against a quiz.
///
/// Questions are graded in quiz order; unanswered questions score zero and
/// are reported as incorrect. The result is a pure function of its inputs,
/// so recomputing from persisted answers reproduces the original score
/// exactly. This is the single scoring codepath for live submission and any
/// later result review.
#[must_use]
pub fn score(quiz: &Quiz, answers: &BTreeMap<QuestionId, Answer>) -> ScoreReport {
    let mut total = 0;
    let mut per_question = Vec::with_capacity(quiz.question_count());

    for question in quiz.questions() {
        let correct = answers
            .get(question.id())
            .is_some_and(|answer| validate::is_correct(question, answer.value()));
        let points_awarded = if correct { question.points() } else { 0 };
        total += points_awarded;
        per_question.push(QuestionResult {
            question_id: question.id().clone(),
            correct,
            points_awarded,
        });
    }

    ScoreReport {
        total,
        per_question,
    }
}
