use std::collections::HashMap;

use crate::models::domain::answer::{Answer, AnswerPayload};
use crate::models::domain::question::QuestionForScoring;

/// Result of scoring an attempt: auto-awarded points, the attainable
/// maximum, and the weight still waiting on manual grading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreOutcome {
    pub score: f64,
    pub max_score: f64,
    pub pending_score: f64,
}

/// Scores an attempt at submit time. Single/multi answers are compared
/// against the expected payload after canonicalization; text/code answers
/// contribute their weight to `pending_score` and award zero until graded.
/// Pure and deterministic: identical inputs produce identical outputs.
pub fn score_attempt(
    questions: &[QuestionForScoring],
    answers: &HashMap<String, Answer>,
) -> ScoreOutcome {
    let mut outcome = ScoreOutcome {
        score: 0.0,
        max_score: 0.0,
        pending_score: 0.0,
    };
    for question in questions {
        outcome.max_score += question.weight;
        let Some(answer) = answers.get(&question.id) else {
            continue;
        };
        if question.kind.is_auto_scored() {
            if is_correct(question, &answer.payload) == Some(true) {
                outcome.score += question.weight;
            }
        } else {
            outcome.pending_score += question.weight;
        }
    }
    outcome
}

/// Recomputes totals with manual grades applied: a graded answer's stored
/// score replaces its auto score, and graded free-form questions leave the
/// pending pool.
pub fn recompute_totals(
    questions: &[QuestionForScoring],
    answers: &HashMap<String, Answer>,
) -> ScoreOutcome {
    let mut outcome = ScoreOutcome {
        score: 0.0,
        max_score: 0.0,
        pending_score: 0.0,
    };
    for question in questions {
        outcome.max_score += question.weight;
        let Some(answer) = answers.get(&question.id) else {
            continue;
        };
        if let Some(graded) = answer.score {
            outcome.score += graded.min(question.weight);
        } else if question.kind.is_auto_scored() {
            if is_correct(question, &answer.payload) == Some(true) {
                outcome.score += question.weight;
            }
        } else {
            outcome.pending_score += question.weight;
        }
    }
    outcome
}

/// Correctness of one answer against its question. `None` for free-form
/// kinds, where correctness only exists once an owner grades the answer.
pub fn is_correct(question: &QuestionForScoring, payload: &AnswerPayload) -> Option<bool> {
    let expected = question.correct.as_ref()?;
    Some(*expected == canonical_payload(payload))
}

/// Canonical comparison form: selections become a sorted, deduplicated
/// `{"selected": [..]}` so option order on the wire never affects scoring.
fn canonical_payload(payload: &AnswerPayload) -> serde_json::Value {
    match payload {
        AnswerPayload::Single(selected) => serde_json::json!({ "selected": [selected] }),
        AnswerPayload::Multi(selected) => {
            let mut sorted = selected.clone();
            sorted.sort_unstable();
            sorted.dedup();
            serde_json::json!({ "selected": sorted })
        }
        AnswerPayload::Text(text) => serde_json::json!({ "text": text }),
        AnswerPayload::Code(code) => {
            serde_json::json!({ "code": { "lang": code.lang, "body": code.body } })
        }
    }
}
