use serde::{Deserialize, Serialize};

/// Question taxonomy mirrored by the answer payload kinds. Single and multi
/// choice are auto-scored; text and code wait for manual grading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Single,
    Multi,
    Text,
    Code,
}

impl QuestionKind {
    pub fn is_auto_scored(&self) -> bool {
        matches!(self, QuestionKind::Single | QuestionKind::Multi)
    }
}

/// Question content as served to the participant: no correctness metadata.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct VisibleQuestion {
    pub id: String,
    pub kind: QuestionKind,
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub options: Vec<VisibleOption>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct VisibleOption {
    pub id: String,
    pub option_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Scoring-side view of a question: weight plus the canonical expected
/// payload (`{"selected": [..]}` for choice questions, absent for free-form).
#[derive(Clone, Debug, PartialEq)]
pub struct QuestionForScoring {
    pub id: String,
    pub kind: QuestionKind,
    pub weight: f64,
    pub correct: Option<serde_json::Value>,
}
