use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::domain::attempt::{Attempt, AttemptStatus, AttemptSummary};
use crate::models::domain::policy::AttemptPolicy;
use crate::models::domain::question::{QuestionKind, VisibleOption, VisibleQuestion};

// ============================================================================
// Attempt views
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AttemptView {
    pub attempt_id: Uuid,
    pub assignment_id: Uuid,
    pub status: AttemptStatus,
    pub version: i64,
    pub time_left_sec: i64,
    pub total: usize,
    pub cursor: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_name: Option<String>,
    pub policy: AttemptPolicyView,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptPolicyView {
    pub shuffle_questions: bool,
    pub shuffle_answers: bool,
    pub require_all_answered: bool,
    pub lock_answer_on_confirm: bool,
    pub disable_copy: bool,
    pub disable_browser_back: bool,
    pub show_elapsed_time: bool,
    pub allow_navigation: bool,
    pub question_time_limit_sec: i64,
    pub max_attempt_time_sec: i64,
    pub reveal_score_mode: crate::models::domain::policy::ScoreRevealMode,
    pub reveal_solutions: bool,
}

impl From<&AttemptPolicy> for AttemptPolicyView {
    fn from(policy: &AttemptPolicy) -> Self {
        AttemptPolicyView {
            shuffle_questions: policy.shuffle_questions,
            shuffle_answers: policy.shuffle_answers,
            require_all_answered: policy.require_all_answered,
            lock_answer_on_confirm: policy.lock_answer_on_confirm,
            disable_copy: policy.disable_copy,
            disable_browser_back: policy.disable_browser_back,
            show_elapsed_time: policy.show_elapsed_time,
            allow_navigation: policy.allow_navigation,
            question_time_limit_sec: policy.question_time_limit_sec.max(0),
            max_attempt_time_sec: policy.max_attempt_time_sec.max(0),
            reveal_score_mode: policy.reveal_score_mode,
            reveal_solutions: policy.reveal_solutions,
        }
    }
}

impl AttemptView {
    pub fn from_attempt(attempt: &Attempt, now: DateTime<Utc>) -> Self {
        let time_left_sec = match attempt.deadline() {
            Some(deadline) if attempt.status() == AttemptStatus::Active && now < deadline => {
                (deadline - now).num_seconds()
            }
            _ => 0,
        };
        AttemptView {
            attempt_id: attempt.id(),
            assignment_id: attempt.assignment_id(),
            status: attempt.status(),
            version: attempt.version(),
            time_left_sec,
            total: attempt.total(),
            cursor: attempt.cursor(),
            guest_name: attempt.guest_name().map(|s| s.to_string()),
            policy: AttemptPolicyView::from(attempt.policy()),
        }
    }
}

// ============================================================================
// Question views
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub kind: QuestionKind,
    pub question_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionView {
    pub id: String,
    pub option_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl QuestionView {
    /// Builds the served view from the snapshot question and the (possibly
    /// shuffled) option order to present.
    pub fn new(question: &VisibleQuestion, options: Vec<VisibleOption>) -> Self {
        QuestionView {
            id: question.id.clone(),
            kind: question.kind,
            question_text: question.question_text.clone(),
            image_url: question.image_url.clone(),
            options: options
                .into_iter()
                .map(|o| OptionView {
                    id: o.id,
                    option_text: o.option_text,
                    image_url: o.image_url,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NextQuestionResponse {
    pub attempt: AttemptView,
    pub question: QuestionView,
}

#[derive(Debug, Serialize)]
pub struct DoneResponse {
    pub done: bool,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub attempt: AttemptView,
    pub question_id: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub attempt: AttemptView,
}

// ============================================================================
// Owner review views
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantView {
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

impl ParticipantView {
    pub fn from_summary(summary: &AttemptSummary) -> Self {
        if let Some(user) = &summary.user {
            ParticipantView {
                kind: "user".to_string(),
                name: user.full_name(),
                user_id: Some(user.id),
            }
        } else if summary.user_id != 0 {
            ParticipantView {
                kind: "user".to_string(),
                name: format!("User #{}", summary.user_id),
                user_id: Some(summary.user_id),
            }
        } else {
            let name = summary
                .guest_name
                .as_deref()
                .filter(|n| !n.is_empty())
                .unwrap_or("Guest");
            ParticipantView {
                kind: "guest".to_string(),
                name: name.to_string(),
                user_id: None,
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttemptSummaryResponse {
    pub attempts: Vec<AttemptSummaryView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummaryView {
    pub attempt_id: Uuid,
    pub assignment_id: Uuid,
    pub test_id: Uuid,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
    pub duration_sec: i64,
    pub score: f64,
    pub max_score: f64,
    pub pending_score: f64,
    pub participant: ParticipantView,
}

impl From<AttemptSummary> for AttemptSummaryView {
    fn from(summary: AttemptSummary) -> Self {
        let participant = ParticipantView::from_summary(&summary);
        AttemptSummaryView {
            attempt_id: summary.attempt_id,
            assignment_id: summary.assignment_id,
            test_id: summary.test_id,
            status: summary.status,
            started_at: summary.started_at,
            submitted_at: summary.submitted_at,
            expired_at: summary.expired_at,
            duration_sec: summary.duration_sec,
            score: summary.score,
            max_score: summary.max_score,
            pending_score: summary.pending_score,
            participant,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttemptDetailsResponse {
    pub attempt: AttemptDetailsView,
    pub answers: Vec<AnsweredQuestionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptDetailsView {
    pub attempt_id: Uuid,
    pub assignment_id: Uuid,
    pub test_id: Uuid,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
    pub duration_sec: i64,
    pub score: f64,
    pub max_score: f64,
    pub pending_score: f64,
    pub participant: ParticipantView,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnsweredQuestionView {
    pub question_id: String,
    pub question_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub kind: QuestionKind,
    pub weight: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<AnsweredOptionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_answer: Option<CodeAnswerView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnsweredOptionView {
    pub id: String,
    pub option_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeAnswerView {
    pub lang: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct GradeAnswerResponse {
    pub attempt: AttemptDetailsView,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::user::UserInfo;
    use chrono::TimeZone;

    fn summary(user_id: u64, guest: Option<&str>, user: Option<UserInfo>) -> AttemptSummary {
        AttemptSummary {
            attempt_id: Uuid::new_v4(),
            assignment_id: Uuid::new_v4(),
            test_id: Uuid::new_v4(),
            user_id,
            guest_name: guest.map(|g| g.to_string()),
            status: AttemptStatus::Submitted,
            started_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            submitted_at: None,
            expired_at: None,
            duration_sec: 600,
            score: 2.0,
            max_score: 3.0,
            pending_score: 0.0,
            user,
        }
    }

    #[test]
    fn test_participant_resolves_directory_name() {
        let info = UserInfo {
            id: 9,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
        };
        let view = ParticipantView::from_summary(&summary(9, None, Some(info)));
        assert_eq!(view.kind, "user");
        assert_eq!(view.name, "Ada Lovelace");
        assert_eq!(view.user_id, Some(9));
    }

    #[test]
    fn test_participant_falls_back_to_user_number() {
        let view = ParticipantView::from_summary(&summary(9, None, None));
        assert_eq!(view.name, "User #9");
    }

    #[test]
    fn test_participant_guest() {
        let view = ParticipantView::from_summary(&summary(0, Some("Kim"), None));
        assert_eq!(view.kind, "guest");
        assert_eq!(view.name, "Kim");
        assert_eq!(view.user_id, None);

        let anonymous = ParticipantView::from_summary(&summary(0, None, None));
        assert_eq!(anonymous.name, "Guest");
    }
}
