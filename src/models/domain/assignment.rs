use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::domain::policy::AttemptPolicy;
use crate::models::domain::question::{
    QuestionForScoring, QuestionKind, VisibleOption, VisibleQuestion,
};

/// What the attempt core needs to know about an assignment: routing ids,
/// the owner, and (when present) the point-in-time template snapshot.
#[derive(Clone, Debug)]
pub struct AssignmentDescriptor {
    pub id: Uuid,
    pub test_id: Uuid,
    pub owner_id: u64,
    pub title: String,
    pub template: Option<AssignmentTemplate>,
}

/// Snapshot of the test taken when the assignment was created. Attempts
/// read served content exclusively from here, so edits to the source test
/// never leak into sittings already underway.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AssignmentTemplate {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration_sec: i64,
    #[serde(default)]
    pub allow_guests: bool,
    #[serde(default)]
    pub available_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub available_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub policy: AttemptPolicy,
    #[serde(default)]
    pub questions: Vec<TemplateQuestion>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TemplateQuestion {
    pub id: String,
    pub kind: QuestionKind,
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Scoring weight; templates written before weights default to 1.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Option indexes that make up the correct answer (choice kinds only).
    #[serde(default)]
    pub correct_options: Vec<i64>,
    #[serde(default)]
    pub options: Vec<TemplateOption>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TemplateOption {
    pub id: String,
    pub option_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

impl AssignmentTemplate {
    /// Participant-facing projection: question content without correctness.
    pub fn visible_questions(&self) -> Vec<VisibleQuestion> {
        visible_projection(&self.questions)
    }

    /// Scoring projection: weight plus the canonical expected payload for
    /// auto-scored kinds. Free-form questions carry no expected payload.
    pub fn questions_for_scoring(&self) -> Vec<QuestionForScoring> {
        scoring_projection(&self.questions)
    }
}

/// Shared by the template snapshot and the live-test read model, so both
/// content sources serve identical shapes.
pub fn visible_projection(questions: &[TemplateQuestion]) -> Vec<VisibleQuestion> {
    questions
        .iter()
        .map(|q| VisibleQuestion {
            id: q.id.clone(),
            kind: q.kind,
            question_text: q.question_text.clone(),
            image_url: q.image_url.clone(),
            options: q
                .options
                .iter()
                .map(|o| VisibleOption {
                    id: o.id.clone(),
                    option_text: o.option_text.clone(),
                    image_url: o.image_url.clone(),
                })
                .collect(),
        })
        .collect()
}

pub fn scoring_projection(questions: &[TemplateQuestion]) -> Vec<QuestionForScoring> {
    questions
        .iter()
        .map(|q| {
            let correct = if q.kind.is_auto_scored() {
                let mut selected = q.correct_options.clone();
                selected.sort_unstable();
                selected.dedup();
                Some(serde_json::json!({ "selected": selected }))
            } else {
                None
            };
            QuestionForScoring {
                id: q.id.clone(),
                kind: q.kind,
                weight: q.weight,
                correct,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> AssignmentTemplate {
        AssignmentTemplate {
            title: "Midterm".to_string(),
            description: String::new(),
            duration_sec: 600,
            allow_guests: true,
            available_from: None,
            available_until: None,
            policy: AttemptPolicy::default(),
            questions: vec![
                TemplateQuestion {
                    id: "q1".to_string(),
                    kind: QuestionKind::Single,
                    question_text: "2 + 2?".to_string(),
                    image_url: None,
                    weight: 1.0,
                    correct_options: vec![1],
                    options: vec![
                        TemplateOption {
                            id: "o1".to_string(),
                            option_text: "3".to_string(),
                            image_url: None,
                        },
                        TemplateOption {
                            id: "o2".to_string(),
                            option_text: "4".to_string(),
                            image_url: None,
                        },
                    ],
                },
                TemplateQuestion {
                    id: "q2".to_string(),
                    kind: QuestionKind::Text,
                    question_text: "Explain.".to_string(),
                    image_url: None,
                    weight: 2.0,
                    correct_options: vec![],
                    options: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_visible_questions_hide_correctness() {
        let visible = template().visible_questions();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].options.len(), 2);
        // VisibleQuestion has no correctness fields at all; the projection
        // only needs to preserve ids and order.
        assert_eq!(visible[0].id, "q1");
        assert_eq!(visible[1].id, "q2");
    }

    #[test]
    fn test_scoring_projection() {
        let scoring = template().questions_for_scoring();
        assert_eq!(
            scoring[0].correct,
            Some(serde_json::json!({ "selected": [1] }))
        );
        assert_eq!(scoring[1].correct, None);
        assert_eq!(scoring[1].weight, 2.0);
    }

    #[test]
    fn test_correct_options_are_canonicalized() {
        let mut tpl = template();
        tpl.questions[0].kind = QuestionKind::Multi;
        tpl.questions[0].correct_options = vec![2, 0, 2];
        let scoring = tpl.questions_for_scoring();
        assert_eq!(
            scoring[0].correct,
            Some(serde_json::json!({ "selected": [0, 2] }))
        );
    }

    #[test]
    fn test_template_decodes_with_missing_fields() {
        let json = serde_json::json!({
            "questions": [
                { "id": "q1", "kind": "single", "question_text": "?" }
            ]
        });
        let tpl: AssignmentTemplate = serde_json::from_value(json).unwrap();
        assert_eq!(tpl.questions[0].weight, 1.0);
        assert!(!tpl.allow_guests);
    }
}
