use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, Document},
    options::IndexOptions,
    Client, ClientSession, Collection, IndexModel,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::Database,
    errors::{AppError, AppResult},
    models::domain::answer::{Answer, AnswerPayload},
    models::domain::attempt::{Attempt, AttemptSnapshot, AttemptStatus, AttemptSummary},
    models::domain::policy::AttemptPolicy,
};

/// Dimension filter for the attempt quota counts. Only populated
/// dimensions are counted; the rest report zero.
#[derive(Clone, Debug, Default)]
pub struct AttemptCountFilter {
    pub assignment_id: Uuid,
    pub user_id: Option<u64>,
    pub guest_name: Option<String>,
    pub client_ip: String,
    pub client_fingerprint: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttemptCounts {
    pub by_user: i64,
    pub by_guest: i64,
    pub by_ip: i64,
    pub by_fingerprint: i64,
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    async fn create(&self, attempt: &Attempt) -> AppResult<Uuid>;
    async fn get_by_id(&self, id: Uuid) -> AppResult<Attempt>;
    async fn get_active_by_user_and_assignment(
        &self,
        user_id: u64,
        assignment_id: Uuid,
    ) -> AppResult<Option<Attempt>>;

    /// Persists one recorded answer plus the attempt's progress fields in a
    /// single transaction. The attempt's version was already bumped by the
    /// aggregate; the update is guarded on the pre-bump version.
    async fn save_answer(&self, attempt: &Attempt, question_id: &str) -> AppResult<()>;

    /// Persists progress fields (cursor, status, expiry, question timer)
    /// without touching answers or bumping the version.
    async fn save_progress(&self, attempt: &Attempt) -> AppResult<()>;

    async fn submit(&self, attempt: &Attempt) -> AppResult<()>;
    async fn cancel(&self, attempt: &Attempt) -> AppResult<()>;

    /// Persists a manual grade: attempt totals plus one answer row,
    /// transactionally, guarded on the pre-bump version.
    async fn save_grade(&self, attempt: &Attempt, question_id: &str) -> AppResult<()>;

    async fn list_summaries_by_assignments(
        &self,
        assignment_ids: &[Uuid],
    ) -> AppResult<Vec<AttemptSummary>>;

    async fn count_attempts(&self, filter: &AttemptCountFilter) -> AppResult<AttemptCounts>;
}

// ============================================================================
// MongoDB implementation
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
struct AttemptRow {
    id: String,
    assignment_id: String,
    test_id: String,
    user_id: i64,
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
    cursor: i64,
}

#[derive(Debug, Deserialize, Serialize)]
struct AnswerRow {
    attempt_id: String,
    question_id: String,
    payload: serde_json::Value,
    is_correct: Option<bool>,
    score: Option<f64>,
}

pub struct MongoAttemptRepository {
    client: Client,
    attempts: Collection<AttemptRow>,
    answers: Collection<AnswerRow>,
}

impl MongoAttemptRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            client: db.client().clone(),
            attempts: db.get_collection("attempts"),
            answers: db.get_collection("answers"),
        }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for attempts and answers collections");

        let id_index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("id_unique".to_string())
                    .build(),
            )
            .build();

        let active_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "assignment_id": 1, "status": 1 })
            .options(
                IndexOptions::builder()
                    .name("user_assignment_status".to_string())
                    .build(),
            )
            .build();

        let assignment_index = IndexModel::builder()
            .keys(doc! { "assignment_id": 1, "started_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("assignment_started".to_string())
                    .build(),
            )
            .build();

        self.attempts.create_index(id_index).await?;
        self.attempts.create_index(active_index).await?;
        self.attempts.create_index(assignment_index).await?;

        let answer_index = IndexModel::builder()
            .keys(doc! { "attempt_id": 1, "question_id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("ux_attempt_question".to_string())
                    .build(),
            )
            .build();

        self.answers.create_index(answer_index).await?;
        Ok(())
    }

    async fn load_answers(&self, attempt_id: &str) -> AppResult<Vec<Answer>> {
        let rows: Vec<AnswerRow> = self
            .answers
            .find(doc! { "attempt_id": attempt_id })
            .await?
            .try_collect()
            .await?;
        rows.into_iter().map(answer_from_row).collect()
    }

    async fn rehydrate(&self, row: AttemptRow) -> AppResult<Attempt> {
        let answers = self.load_answers(&row.id).await?;
        attempt_from_row(row, answers)
    }

    /// Guarded attempt-row update inside an open session. Zero matched
    /// rows means another writer advanced the version first.
    async fn guarded_update(
        &self,
        session: &mut ClientSession,
        attempt_id: Uuid,
        expected_version: i64,
        update: Document,
    ) -> AppResult<()> {
        let result = self
            .attempts
            .update_one(
                doc! { "id": attempt_id.to_string(), "version": expected_version },
                doc! { "$set": update },
            )
            .session(&mut *session)
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::VersionMismatch(format!(
                "attempt {} was modified concurrently",
                attempt_id
            )));
        }
        Ok(())
    }

    async fn count_dimension(&self, filter: Document) -> AppResult<i64> {
        let count = self.attempts.count_documents(filter).await?;
        Ok(count as i64)
    }
}

#[async_trait]
impl AttemptRepository for MongoAttemptRepository {
    async fn create(&self, attempt: &Attempt) -> AppResult<Uuid> {
        let row = attempt_to_row(attempt);
        self.attempts.insert_one(&row).await?;
        Ok(attempt.id())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Attempt> {
        let row = self
            .attempts
            .find_one(doc! { "id": id.to_string() })
            .await?
            .ok_or_else(|| AppError::NotFound(format!("attempt '{}' not found", id)))?;
        self.rehydrate(row).await
    }

    async fn get_active_by_user_and_assignment(
        &self,
        user_id: u64,
        assignment_id: Uuid,
    ) -> AppResult<Option<Attempt>> {
        let row = self
            .attempts
            .find_one(doc! {
                "user_id": user_id as i64,
                "assignment_id": assignment_id.to_string(),
                "status": "active",
            })
            .await?;
        match row {
            Some(row) => Ok(Some(self.rehydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn save_answer(&self, attempt: &Attempt, question_id: &str) -> AppResult<()> {
        let answer = attempt.answer(question_id).ok_or_else(|| {
            AppError::InternalError(format!("answer row for '{}' not prepared", question_id))
        })?;
        let answer_row = answer_to_row(attempt.id(), &answer)?;
        let progress = progress_fields(attempt)?;

        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let outcome: AppResult<()> = async {
            self.guarded_update(&mut session, attempt.id(), attempt.version() - 1, progress)
                .await?;
            self.answers
                .update_one(
                    doc! {
                        "attempt_id": attempt.id().to_string(),
                        "question_id": question_id,
                    },
                    doc! { "$set": to_bson(&answer_row)? },
                )
                .upsert(true)
                .session(&mut session)
                .await?;
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                session.commit_transaction().await?;
                Ok(())
            }
            Err(err) => {
                let _ = session.abort_transaction().await;
                Err(err)
            }
        }
    }

    async fn save_progress(&self, attempt: &Attempt) -> AppResult<()> {
        let result = self
            .attempts
            .update_one(
                doc! {
                    "id": attempt.id().to_string(),
                    "version": attempt.version(),
                },
                doc! { "$set": progress_fields(attempt)? },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::VersionMismatch(format!(
                "attempt {} was modified concurrently",
                attempt.id()
            )));
        }
        Ok(())
    }

    async fn submit(&self, attempt: &Attempt) -> AppResult<()> {
        let (score, max_score) = attempt.score();
        let update = doc! {
            "status": to_bson(&attempt.status())?,
            "submitted_at": to_bson(&attempt.submitted_at())?,
            "score": score,
            "max_score": max_score,
            "pending_score": attempt.pending_score(),
            "version": attempt.version(),
        };

        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        let outcome = self
            .guarded_update(&mut session, attempt.id(), attempt.version() - 1, update)
            .await;
        match outcome {
            Ok(()) => {
                session.commit_transaction().await?;
                Ok(())
            }
            Err(err) => {
                let _ = session.abort_transaction().await;
                Err(err)
            }
        }
    }

    async fn cancel(&self, attempt: &Attempt) -> AppResult<()> {
        let result = self
            .attempts
            .update_one(
                doc! {
                    "id": attempt.id().to_string(),
                    "version": attempt.version() - 1,
                },
                doc! { "$set": {
                    "status": to_bson(&attempt.status())?,
                    "version": attempt.version(),
                } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::VersionMismatch(format!(
                "attempt {} was modified concurrently",
                attempt.id()
            )));
        }
        Ok(())
    }

    async fn save_grade(&self, attempt: &Attempt, question_id: &str) -> AppResult<()> {
        let answer = attempt.answer(question_id).ok_or_else(|| {
            AppError::InternalError(format!("answer row for '{}' not prepared", question_id))
        })?;
        let (score, _) = attempt.score();
        let update = doc! {
            "score": score,
            "pending_score": attempt.pending_score(),
            "version": attempt.version(),
        };

        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let outcome: AppResult<()> = async {
            self.guarded_update(&mut session, attempt.id(), attempt.version() - 1, update)
                .await?;
            self.answers
                .update_one(
                    doc! {
                        "attempt_id": attempt.id().to_string(),
                        "question_id": question_id,
                    },
                    doc! { "$set": {
                        "is_correct": to_bson(&answer.is_correct)?,
                        "score": to_bson(&answer.score)?,
                    } },
                )
                .session(&mut session)
                .await?;
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                session.commit_transaction().await?;
                Ok(())
            }
            Err(err) => {
                let _ = session.abort_transaction().await;
                Err(err)
            }
        }
    }

    async fn list_summaries_by_assignments(
        &self,
        assignment_ids: &[Uuid],
    ) -> AppResult<Vec<AttemptSummary>> {
        let ids: Vec<String> = assignment_ids.iter().map(|id| id.to_string()).collect();
        let rows: Vec<AttemptRow> = self
            .attempts
            .find(doc! { "assignment_id": { "$in": ids } })
            .sort(doc! { "started_at": -1 })
            .await?
            .try_collect()
            .await?;
        rows.into_iter().map(summary_from_row).collect()
    }

    async fn count_attempts(&self, filter: &AttemptCountFilter) -> AppResult<AttemptCounts> {
        let base = doc! {
            "assignment_id": filter.assignment_id.to_string(),
            "status": { "$ne": "canceled" },
        };

        let by_user = async {
            match filter.user_id {
                Some(user_id) => {
                    let mut f = base.clone();
                    f.insert("user_id", user_id as i64);
                    self.count_dimension(f).await
                }
                None => Ok(0),
            }
        };
        let by_guest = async {
            match filter.guest_name.as_deref() {
                Some(guest_name) if !guest_name.is_empty() => {
                    let mut f = base.clone();
                    f.insert("guest_name", guest_name);
                    self.count_dimension(f).await
                }
                _ => Ok(0),
            }
        };
        let by_ip = async {
            if filter.client_ip.is_empty() {
                Ok(0)
            } else {
                let mut f = base.clone();
                f.insert("client_ip", filter.client_ip.as_str());
                self.count_dimension(f).await
            }
        };
        let by_fingerprint = async {
            if filter.client_fingerprint.is_empty() {
                Ok(0)
            } else {
                let mut f = base.clone();
                f.insert("client_fingerprint", filter.client_fingerprint.as_str());
                self.count_dimension(f).await
            }
        };

        let (by_user, by_guest, by_ip, by_fingerprint) =
            futures::try_join!(by_user, by_guest, by_ip, by_fingerprint)?;
        Ok(AttemptCounts {
            by_user,
            by_guest,
            by_ip,
            by_fingerprint,
        })
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn attempt_to_row(attempt: &Attempt) -> AttemptRow {
    let (score, max_score) = attempt.score();
    AttemptRow {
        id: attempt.id().to_string(),
        assignment_id: attempt.assignment_id().to_string(),
        test_id: attempt.test_id().to_string(),
        user_id: attempt.user_id() as i64,
        guest_name: attempt.guest_name().map(|s| s.to_string()),
        started_at: attempt.started_at(),
        submitted_at: attempt.submitted_at(),
        expired_at: attempt.expired_at(),
        status: attempt.status(),
        policy: attempt.policy().clone(),
        version: attempt.version(),
        seed: attempt.seed(),
        score,
        max_score,
        pending_score: attempt.pending_score(),
        client_ip: attempt.client_ip().to_string(),
        client_fingerprint: attempt.client_fingerprint().to_string(),
        question_opened_at: attempt.question_opened_at(),
        plan: attempt.plan().to_vec(),
        cursor: attempt.cursor() as i64,
    }
}

fn attempt_from_row(row: AttemptRow, answers: Vec<Answer>) -> AppResult<Attempt> {
    let parse_id = |field: &str, value: &str| {
        Uuid::parse_str(value)
            .map_err(|e| AppError::DatabaseError(format!("bad {} in attempt row: {}", field, e)))
    };
    Attempt::rehydrate(AttemptSnapshot {
        id: parse_id("id", &row.id)?,
        assignment_id: parse_id("assignment_id", &row.assignment_id)?,
        test_id: parse_id("test_id", &row.test_id)?,
        user_id: row.user_id.max(0) as u64,
        guest_name: row.guest_name,
        started_at: row.started_at,
        submitted_at: row.submitted_at,
        expired_at: row.expired_at,
        status: row.status,
        policy: row.policy,
        version: row.version,
        seed: row.seed,
        score: row.score,
        max_score: row.max_score,
        pending_score: row.pending_score,
        client_ip: row.client_ip,
        client_fingerprint: row.client_fingerprint,
        question_opened_at: row.question_opened_at,
        plan: row.plan,
        cursor: row.cursor.max(0) as usize,
        answers,
    })
}

fn summary_from_row(row: AttemptRow) -> AppResult<AttemptSummary> {
    let parse_id = |field: &str, value: &str| {
        Uuid::parse_str(value)
            .map_err(|e| AppError::DatabaseError(format!("bad {} in attempt row: {}", field, e)))
    };
    Ok(AttemptSummary {
        attempt_id: parse_id("id", &row.id)?,
        assignment_id: parse_id("assignment_id", &row.assignment_id)?,
        test_id: parse_id("test_id", &row.test_id)?,
        user_id: row.user_id.max(0) as u64,
        guest_name: row.guest_name,
        status: row.status,
        started_at: row.started_at,
        submitted_at: row.submitted_at,
        expired_at: row.expired_at,
        duration_sec: row.policy.max_attempt_time_sec.max(0),
        score: row.score,
        max_score: row.max_score,
        pending_score: row.pending_score,
        user: None,
    })
}

fn progress_fields(attempt: &Attempt) -> AppResult<Document> {
    Ok(doc! {
        "version": attempt.version(),
        "cursor": attempt.cursor() as i64,
        "status": to_bson(&attempt.status())?,
        "expired_at": to_bson(&attempt.expired_at())?,
        "question_opened_at": to_bson(&attempt.question_opened_at())?,
    })
}

fn answer_to_row(attempt_id: Uuid, answer: &Answer) -> AppResult<AnswerRow> {
    Ok(AnswerRow {
        attempt_id: attempt_id.to_string(),
        question_id: answer.question_id.clone(),
        payload: answer.payload.to_json(),
        is_correct: answer.is_correct,
        score: answer.score,
    })
}

fn answer_from_row(row: AnswerRow) -> AppResult<Answer> {
    Ok(Answer {
        question_id: row.question_id,
        payload: AnswerPayload::from_json(&row.payload)?,
        is_correct: row.is_correct,
        score: row.score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::policy::AttemptPolicy;
    use chrono::{TimeZone, Utc};

    fn make_attempt() -> Attempt {
        let mut attempt = Attempt::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            7,
            None,
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            AttemptPolicy {
                max_attempt_time_sec: 600,
                ..AttemptPolicy::default()
            },
            -99,
            vec!["q1".to_string(), "q2".to_string()],
            "10.1.2.3".to_string(),
            "fp-123456".to_string(),
        );
        attempt
            .answer_current(
                0,
                Utc.with_ymd_and_hms(2024, 6, 1, 12, 1, 0).unwrap(),
                AnswerPayload::Multi(vec![0, 2]),
            )
            .unwrap();
        attempt
    }

    #[test]
    fn test_row_round_trip_preserves_observable_state() {
        let attempt = make_attempt();
        let row = attempt_to_row(&attempt);
        let answers: Vec<Answer> = attempt.answers().into_values().collect();
        let loaded = attempt_from_row(row, answers).unwrap();

        assert_eq!(loaded.id(), attempt.id());
        assert_eq!(loaded.assignment_id(), attempt.assignment_id());
        assert_eq!(loaded.user_id(), attempt.user_id());
        assert_eq!(loaded.status(), attempt.status());
        assert_eq!(loaded.version(), attempt.version());
        assert_eq!(loaded.seed(), attempt.seed());
        assert_eq!(loaded.cursor(), attempt.cursor());
        assert_eq!(loaded.plan(), attempt.plan());
        assert_eq!(loaded.answer("q1"), attempt.answer("q1"));
        assert_eq!(loaded.policy(), attempt.policy());
        assert_eq!(loaded.client_fingerprint(), attempt.client_fingerprint());
    }

    #[test]
    fn test_summary_projection() {
        let attempt = make_attempt();
        let summary = summary_from_row(attempt_to_row(&attempt)).unwrap();
        assert_eq!(summary.attempt_id, attempt.id());
        assert_eq!(summary.duration_sec, 600);
        assert_eq!(summary.status, AttemptStatus::Active);
        assert!(summary.user.is_none());
    }

    #[test]
    fn test_answer_row_round_trip() {
        let answer = Answer {
            question_id: "q9".to_string(),
            payload: AnswerPayload::Text("hello".to_string()),
            is_correct: Some(false),
            score: Some(0.5),
        };
        let attempt_id = Uuid::new_v4();
        let row = answer_to_row(attempt_id, &answer).unwrap();
        assert_eq!(row.attempt_id, attempt_id.to_string());
        let back = answer_from_row(row).unwrap();
        assert_eq!(back, answer);
    }
}
