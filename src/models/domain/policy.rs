use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoreRevealMode {
    #[default]
    Never,
    AfterSubmit,
    Always,
}

/// Per-attempt behavior knobs, captured from the assignment template when
/// the attempt starts and immutable afterwards. Stored as an embedded
/// document; missing keys fall back to their defaults so older rows keep
/// loading after new knobs are added.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AttemptPolicy {
    #[serde(default)]
    pub shuffle_questions: bool,
    #[serde(default)]
    pub shuffle_answers: bool,
    /// 0 = serve the whole plan.
    #[serde(default)]
    pub max_questions: i64,
    /// Seconds per question; 0 = no per-question timer.
    #[serde(default)]
    pub question_time_limit_sec: i64,
    /// Seconds for the whole attempt; 0 = no attempt deadline.
    #[serde(default)]
    pub max_attempt_time_sec: i64,
    #[serde(default)]
    pub require_all_answered: bool,
    #[serde(default)]
    pub lock_answer_on_confirm: bool,
    #[serde(default)]
    pub disable_copy: bool,
    #[serde(default)]
    pub disable_browser_back: bool,
    #[serde(default)]
    pub show_elapsed_time: bool,
    #[serde(default)]
    pub reveal_score_mode: ScoreRevealMode,
    #[serde(default)]
    pub reveal_solutions: bool,
    #[serde(default)]
    pub allow_navigation: bool,
    /// 0 = unlimited attempts per participant dimension.
    #[serde(default)]
    pub max_attempts: i64,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            shuffle_questions: false,
            shuffle_answers: false,
            max_questions: 0,
            question_time_limit_sec: 0,
            max_attempt_time_sec: 0,
            require_all_answered: false,
            lock_answer_on_confirm: false,
            disable_copy: false,
            disable_browser_back: false,
            show_elapsed_time: false,
            reveal_score_mode: ScoreRevealMode::Never,
            reveal_solutions: false,
            allow_navigation: false,
            max_attempts: 0,
        }
    }
}

impl AttemptPolicy {
    pub fn question_time_limit(&self) -> Option<Duration> {
        if self.question_time_limit_sec > 0 {
            Some(Duration::seconds(self.question_time_limit_sec))
        } else {
            None
        }
    }

    pub fn max_attempt_time(&self) -> Option<Duration> {
        if self.max_attempt_time_sec > 0 {
            Some(Duration::seconds(self.max_attempt_time_sec))
        } else {
            None
        }
    }
}
