use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::domain::answer::{Answer, AnswerPayload};
use crate::models::domain::policy::AttemptPolicy;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Active,
    Submitted,
    Expired,
    Canceled,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Active => "active",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::Expired => "expired",
            AttemptStatus::Canceled => "canceled",
        }
    }
}

/// A single participant's sitting of an assignment.
///
/// Pure state machine: no I/O, time only enters through the `now` argument
/// of each operation. `active` is the only non-terminal status. Expiry is
/// implicit: any operation that observes the deadline in the past first
/// transitions the attempt to `expired`, then reports its own failure.
/// Every successful mutation bumps `version`, which the persistence layer
/// uses as its optimistic concurrency guard.
pub struct Attempt {
    id: Uuid,
    assignment_id: Uuid,
    test_id: Uuid,
    user_id: u64, // 0 = guest
    guest_name: Option<String>,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    expired_at: Option<DateTime<Utc>>,
    status: AttemptStatus,
    policy: AttemptPolicy,
    version: i64,
    seed: i64,
    score: f64,
    max_score: f64,
    pending_score: f64,
    client_ip: String,
    client_fingerprint: String,
    question_opened_at: Option<DateTime<Utc>>,
    plan: Vec<String>,
    cursor: usize,
    answers: HashMap<String, Answer>,
}

/// Persisted state of an attempt, used to rebuild the aggregate on load.
#[derive(Clone)]
pub struct AttemptSnapshot {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub test_id: Uuid,
    pub user_id: u64,
    pub guest_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub status: AttemptStatus,
    pub policy: AttemptPolicy,
    pub version: i64,
    pub seed: i64,
    pub score: f64,
    pub max_score: f64,
    pub pending_score: f64,
    pub client_ip: String,
    pub client_fingerprint: String,
    pub question_opened_at: Option<DateTime<Utc>>,
    pub plan: Vec<String>,
    pub cursor: usize,
    pub answers: Vec<Answer>,
}

impl Attempt {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        assignment_id: Uuid,
        test_id: Uuid,
        user_id: u64,
        guest_name: Option<String>,
        now: DateTime<Utc>,
        policy: AttemptPolicy,
        seed: i64,
        plan: Vec<String>,
        client_ip: String,
        client_fingerprint: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            assignment_id,
            test_id,
            user_id,
            guest_name,
            started_at: now,
            submitted_at: None,
            expired_at: None,
            status: AttemptStatus::Active,
            policy,
            version: 0,
            seed,
            score: 0.0,
            max_score: 0.0,
            pending_score: 0.0,
            client_ip,
            client_fingerprint,
            question_opened_at: None,
            plan,
            cursor: 0,
            answers: HashMap::new(),
        }
    }

    /// Rebuilds the aggregate from its persisted state, rejecting rows that
    /// would violate the aggregate's invariants.
    pub fn rehydrate(snapshot: AttemptSnapshot) -> AppResult<Self> {
        if snapshot.version < 0 {
            return Err(AppError::Validation(format!(
                "version must be non-negative: {}",
                snapshot.version
            )));
        }
        if snapshot.cursor > snapshot.plan.len() {
            return Err(AppError::Validation(format!(
                "cursor out of range: {} > {}",
                snapshot.cursor,
                snapshot.plan.len()
            )));
        }
        if snapshot.answers.len() > snapshot.cursor {
            return Err(AppError::Validation(format!(
                "more answers than served questions: {} > {}",
                snapshot.answers.len(),
                snapshot.cursor
            )));
        }
        validate_persisted_scores(snapshot.score, snapshot.max_score)?;
        if snapshot.status == AttemptStatus::Submitted && snapshot.submitted_at.is_none() {
            return Err(AppError::Validation(
                "submitted attempt without submitted_at".to_string(),
            ));
        }

        let mut answers = HashMap::with_capacity(snapshot.answers.len());
        for answer in snapshot.answers {
            if !snapshot.plan.contains(&answer.question_id) {
                return Err(AppError::Validation(format!(
                    "answer for question '{}' outside the plan",
                    answer.question_id
                )));
            }
            answers.insert(answer.question_id.clone(), answer);
        }

        Ok(Self {
            id: snapshot.id,
            assignment_id: snapshot.assignment_id,
            test_id: snapshot.test_id,
            user_id: snapshot.user_id,
            guest_name: snapshot.guest_name,
            started_at: snapshot.started_at,
            submitted_at: snapshot.submitted_at,
            expired_at: snapshot.expired_at,
            status: snapshot.status,
            policy: snapshot.policy,
            version: snapshot.version,
            seed: snapshot.seed,
            score: snapshot.score,
            max_score: snapshot.max_score,
            pending_score: snapshot.pending_score,
            client_ip: snapshot.client_ip,
            client_fingerprint: snapshot.client_fingerprint,
            question_opened_at: snapshot.question_opened_at,
            plan: snapshot.plan,
            cursor: snapshot.cursor,
            answers,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
    pub fn assignment_id(&self) -> Uuid {
        self.assignment_id
    }
    pub fn test_id(&self) -> Uuid {
        self.test_id
    }
    pub fn user_id(&self) -> u64 {
        self.user_id
    }
    pub fn guest_name(&self) -> Option<&str> {
        self.guest_name.as_deref()
    }
    pub fn status(&self) -> AttemptStatus {
        self.status
    }
    pub fn version(&self) -> i64 {
        self.version
    }
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }
    pub fn expired_at(&self) -> Option<DateTime<Utc>> {
        self.expired_at
    }
    pub fn policy(&self) -> &AttemptPolicy {
        &self.policy
    }
    pub fn seed(&self) -> i64 {
        self.seed
    }
    pub fn score(&self) -> (f64, f64) {
        (self.score, self.max_score)
    }
    pub fn pending_score(&self) -> f64 {
        self.pending_score
    }
    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }
    pub fn client_fingerprint(&self) -> &str {
        &self.client_fingerprint
    }
    pub fn question_opened_at(&self) -> Option<DateTime<Utc>> {
        self.question_opened_at
    }
    pub fn total(&self) -> usize {
        self.plan.len()
    }
    pub fn cursor(&self) -> usize {
        self.cursor
    }
    pub fn plan(&self) -> &[String] {
        &self.plan
    }

    /// Cloned answer map; callers cannot reach the aggregate's own state.
    pub fn answers(&self) -> HashMap<String, Answer> {
        self.answers.clone()
    }

    pub fn answer(&self, question_id: &str) -> Option<Answer> {
        self.answers.get(question_id).cloned()
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.policy
            .max_attempt_time()
            .map(|limit| self.started_at + limit)
    }

    fn exceeded(&self, now: DateTime<Utc>) -> bool {
        match self.deadline() {
            Some(deadline) => deadline <= now,
            None => false,
        }
    }

    /// Transitions to `expired` at the attempt deadline when `now` is past
    /// it. Returns true if the attempt is no longer active afterwards.
    fn expire_if_exceeded(&mut self, now: DateTime<Utc>) -> bool {
        if self.exceeded(now) {
            if self.status == AttemptStatus::Active {
                self.status = AttemptStatus::Expired;
                self.expired_at = self.deadline();
            }
            return true;
        }
        false
    }

    fn question_timer_exceeded(&self, now: DateTime<Utc>) -> bool {
        match (self.policy.question_time_limit(), self.question_opened_at) {
            (Some(limit), Some(opened_at)) => now - opened_at > limit,
            _ => false,
        }
    }

    /// Serves the id of the next question in the plan, arming the
    /// per-question timer on first serve. Read-only with respect to the
    /// version: retrying this call is safe, and the timer is armed only if
    /// it is not already running for the current cursor.
    pub fn next_question_id(&mut self, now: DateTime<Utc>) -> AppResult<String> {
        if self.expire_if_exceeded(now) {
            return Err(AppError::Closed(format!(
                "attempt is {}",
                self.status.as_str()
            )));
        }
        if self.question_timer_exceeded(now) {
            self.status = AttemptStatus::Expired;
            self.expired_at = Some(now);
            return Err(AppError::QuestionTimeLimit(
                "question time limit exceeded".to_string(),
            ));
        }
        if self.status != AttemptStatus::Active {
            return Err(AppError::Closed(format!(
                "attempt is {}",
                self.status.as_str()
            )));
        }
        if self.cursor >= self.plan.len() {
            return Err(AppError::NoMoreQuestions);
        }
        if self.policy.question_time_limit().is_some() {
            if self.question_opened_at.is_none() {
                self.question_opened_at = Some(now);
            }
        } else {
            self.question_opened_at = None;
        }
        Ok(self.plan[self.cursor].clone())
    }

    /// Records an answer for the question at the cursor and advances it.
    /// The answered question is always the one currently at the cursor;
    /// there is no random-access answering.
    pub fn answer_current(
        &mut self,
        expected_version: i64,
        now: DateTime<Utc>,
        payload: AnswerPayload,
    ) -> AppResult<(i64, String)> {
        if self.expire_if_exceeded(now) {
            return Err(AppError::Closed(format!(
                "attempt is {}",
                self.status.as_str()
            )));
        }
        if self.status != AttemptStatus::Active {
            return Err(AppError::Closed(format!(
                "attempt is {}",
                self.status.as_str()
            )));
        }
        if expected_version != self.version {
            return Err(AppError::VersionMismatch(format!(
                "have={} want={}",
                self.version, expected_version
            )));
        }
        payload.validate()?;
        if self.cursor >= self.plan.len() {
            return Err(AppError::NoMoreQuestions);
        }
        if self.question_timer_exceeded(now) {
            self.status = AttemptStatus::Expired;
            self.expired_at = Some(now);
            return Err(AppError::QuestionTimeLimit(
                "question time limit exceeded".to_string(),
            ));
        }

        let question_id = self.plan[self.cursor].clone();
        self.answers.insert(
            question_id.clone(),
            Answer::new(question_id.clone(), payload),
        );
        self.cursor += 1;
        self.version += 1;
        self.question_opened_at = None;
        Ok((self.version, question_id))
    }

    /// Terminal transition to `submitted`, recording the scoring outcome.
    pub fn submit(
        &mut self,
        expected_version: i64,
        now: DateTime<Utc>,
        score: f64,
        max_score: f64,
        pending_score: f64,
    ) -> AppResult<i64> {
        self.expire_if_exceeded(now);
        if self.status != AttemptStatus::Active {
            return Err(AppError::InvalidState(format!(
                "submit from status={} is not allowed",
                self.status.as_str()
            )));
        }
        if expected_version != self.version {
            return Err(AppError::VersionMismatch(format!(
                "have={} want={}",
                self.version, expected_version
            )));
        }
        validate_scores(score, max_score)?;
        if self.policy.require_all_answered && self.answers.len() < self.plan.len() {
            return Err(AppError::InvalidState(
                "all questions must be answered".to_string(),
            ));
        }
        self.score = score;
        self.max_score = max_score;
        self.pending_score = pending_score;
        self.status = AttemptStatus::Submitted;
        self.submitted_at = Some(now);
        self.version += 1;
        Ok(self.version)
    }

    /// Terminal transition to `canceled`.
    pub fn cancel(&mut self, expected_version: i64, now: DateTime<Utc>) -> AppResult<i64> {
        self.expire_if_exceeded(now);
        if self.status != AttemptStatus::Active {
            return Err(AppError::InvalidState(format!(
                "cancel from status={} is not allowed",
                self.status.as_str()
            )));
        }
        if expected_version != self.version {
            return Err(AppError::VersionMismatch(format!(
                "have={} want={}",
                self.version, expected_version
            )));
        }
        self.status = AttemptStatus::Canceled;
        self.version += 1;
        Ok(self.version)
    }

    /// Post-submit manual grade for one answered question. The caller
    /// supplies the recomputed totals (with the new grade applied); the
    /// attempt's `max_score` is unchanged by grading.
    pub fn grade_answer(
        &mut self,
        question_id: &str,
        score: f64,
        is_correct: Option<bool>,
        new_total: f64,
        new_pending: f64,
    ) -> AppResult<i64> {
        if self.status != AttemptStatus::Submitted {
            return Err(AppError::InvalidState(format!(
                "grading from status={} is not allowed",
                self.status.as_str()
            )));
        }
        if !score.is_finite() || score < 0.0 {
            return Err(AppError::Validation(
                "grade score must be a non-negative finite number".to_string(),
            ));
        }
        if !new_total.is_finite() || new_total < 0.0 || new_total > self.max_score {
            return Err(AppError::Validation(
                "recomputed total must be within [0, max_score]".to_string(),
            ));
        }
        let answer = self.answers.get_mut(question_id).ok_or_else(|| {
            AppError::NotFound(format!("no answer recorded for question '{}'", question_id))
        })?;
        answer.score = Some(score);
        answer.is_correct = is_correct;
        self.score = new_total;
        self.pending_score = new_pending.max(0.0);
        self.version += 1;
        Ok(self.version)
    }
}

/// Row-level projection for the owner's attempt list; carries no answers.
#[derive(Clone, Debug)]
pub struct AttemptSummary {
    pub attempt_id: Uuid,
    pub assignment_id: Uuid,
    pub test_id: Uuid,
    pub user_id: u64,
    pub guest_name: Option<String>,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub duration_sec: i64,
    pub score: f64,
    pub max_score: f64,
    pub pending_score: f64,
    pub user: Option<crate::models::domain::user::UserInfo>,
}

fn validate_scores(score: f64, max: f64) -> AppResult<()> {
    if !score.is_finite() || !max.is_finite() {
        return Err(AppError::Validation(
            "score/max must be finite numbers".to_string(),
        ));
    }
    if max <= 0.0 {
        return Err(AppError::Validation("max must be > 0".to_string()));
    }
    if score < 0.0 || score > max {
        return Err(AppError::Validation(
            "score must be within [0, max]".to_string(),
        ));
    }
    Ok(())
}

fn validate_persisted_scores(score: f64, max: f64) -> AppResult<()> {
    if !score.is_finite() || !max.is_finite() {
        return Err(AppError::Validation(
            "score/max must be finite numbers".to_string(),
        ));
    }
    if max < 0.0 || score < 0.0 {
        return Err(AppError::Validation(
            "scores must be non-negative".to_string(),
        ));
    }
    if max > 0.0 && score > max {
        return Err(AppError::Validation(
            "score must be within [0, max]".to_string(),
        ));
    }
    Ok(())
}
