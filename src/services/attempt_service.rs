use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult},
    models::domain::answer::{Answer, AnswerPayload},
    models::domain::assignment::AssignmentDescriptor,
    models::domain::attempt::{Attempt, AttemptSummary},
    models::domain::policy::AttemptPolicy,
    models::domain::question::{QuestionForScoring, VisibleQuestion},
    models::dto::response::{
        AnsweredOptionView, AnsweredQuestionView, AttemptDetailsResponse, AttemptDetailsView,
        AttemptView, CodeAnswerView, GradeAnswerResponse, NextQuestionResponse, ParticipantView,
        QuestionView,
    },
    repositories::{
        AssignmentReadModel, AttemptCountFilter, AttemptRepository, TestReadModel, UserDirectory,
    },
    services::access_policy::AccessPolicy,
    services::clock::{Clock, SeedSource},
    services::{scoring, shuffle},
};

/// Request-scoped metadata captured at start and used for quota counting.
#[derive(Clone, Debug, Default)]
pub struct AttemptMetadata {
    pub client_ip: String,
    pub fingerprint: String,
}

/// Effective settings for one start: either the assignment's template
/// snapshot or, for assignments that predate snapshots, the live test.
struct EffectiveSettings {
    duration_sec: i64,
    available_from: Option<DateTime<Utc>>,
    available_until: Option<DateTime<Utc>>,
    allow_guests: bool,
    policy: AttemptPolicy,
}

pub struct AttemptService {
    repository: Arc<dyn AttemptRepository>,
    assignments: Arc<dyn AssignmentReadModel>,
    tests: Arc<dyn TestReadModel>,
    users: Arc<dyn UserDirectory>,
    access: Arc<dyn AccessPolicy>,
    clock: Arc<dyn Clock>,
    seeds: Arc<dyn SeedSource>,
}

impl AttemptService {
    pub fn new(
        repository: Arc<dyn AttemptRepository>,
        assignments: Arc<dyn AssignmentReadModel>,
        tests: Arc<dyn TestReadModel>,
        users: Arc<dyn UserDirectory>,
        access: Arc<dyn AccessPolicy>,
        clock: Arc<dyn Clock>,
        seeds: Arc<dyn SeedSource>,
    ) -> Self {
        Self {
            repository,
            assignments,
            tests,
            users,
            access,
            clock,
            seeds,
        }
    }

    pub async fn start_attempt(
        &self,
        requester: Option<u64>,
        guest_name: Option<String>,
        assignment_id: Uuid,
        meta: AttemptMetadata,
    ) -> AppResult<AttemptView> {
        let descriptor = self.assignments.get_assignment(assignment_id).await?;
        let settings = self.effective_settings(&descriptor).await?;

        self.access.can_start_attempt(
            requester,
            guest_name.as_deref(),
            settings.allow_guests,
        )?;

        let now = self.clock.now();
        if let Some(from) = settings.available_from {
            if now < from {
                return Err(AppError::Validation("test not yet available".to_string()));
            }
        }
        if let Some(until) = settings.available_until {
            if now > until {
                return Err(AppError::Validation("test window expired".to_string()));
            }
        }

        // An authenticated user resumes their active attempt instead of
        // opening a second one.
        if let Some(user_id) = requester {
            if let Some(active) = self
                .repository
                .get_active_by_user_and_assignment(user_id, assignment_id)
                .await?
            {
                return Ok(AttemptView::from_attempt(&active, now));
            }
        }

        let mut policy = settings.policy;
        if policy.max_attempts > 0 {
            let counts = self
                .repository
                .count_attempts(&AttemptCountFilter {
                    assignment_id,
                    user_id: requester,
                    guest_name: guest_name.clone(),
                    client_ip: meta.client_ip.clone(),
                    client_fingerprint: meta.fingerprint.clone(),
                })
                .await?;
            let limit = policy.max_attempts;
            if requester.is_some() && counts.by_user >= limit {
                return Err(AppError::MaxAttempts(format!("limit is {}", limit)));
            }
            if requester.is_none() && guest_name.is_some() && counts.by_guest >= limit {
                return Err(AppError::MaxAttempts(format!("limit is {}", limit)));
            }
            if !meta.fingerprint.is_empty() && counts.by_fingerprint >= limit {
                return Err(AppError::MaxAttempts(format!("limit is {}", limit)));
            }
            if !meta.client_ip.is_empty() && counts.by_ip >= limit {
                return Err(AppError::MaxAttempts(format!("limit is {}", limit)));
            }
        }

        let seed = now.timestamp_nanos_opt().unwrap_or_default() ^ self.seeds.next_seed();
        if policy.max_attempt_time_sec <= 0 && settings.duration_sec > 0 {
            policy.max_attempt_time_sec = settings.duration_sec;
        }

        let visible = self.visible_questions(&descriptor).await?;
        let mut plan: Vec<String> = if policy.shuffle_questions {
            shuffle::shuffle_question_ids(&visible, seed)
        } else {
            visible.iter().map(|q| q.id.clone()).collect()
        };
        if policy.max_questions > 0 && plan.len() > policy.max_questions as usize {
            plan.truncate(policy.max_questions as usize);
        }

        let attempt = Attempt::new(
            assignment_id,
            descriptor.test_id,
            requester.unwrap_or(0),
            guest_name,
            now,
            policy,
            seed,
            plan,
            meta.client_ip,
            meta.fingerprint,
        );
        self.repository.create(&attempt).await?;
        log::info!(
            "Started attempt {} for assignment {} (user {})",
            attempt.id(),
            assignment_id,
            attempt.user_id()
        );
        Ok(AttemptView::from_attempt(&attempt, now))
    }

    pub async fn next_question(
        &self,
        requester: Option<u64>,
        attempt_id: Uuid,
    ) -> AppResult<NextQuestionResponse> {
        let mut attempt = self.repository.get_by_id(attempt_id).await?;
        self.access.can_modify_attempt(requester, &attempt)?;

        let descriptor = self
            .assignments
            .get_assignment(attempt.assignment_id())
            .await?;
        let now = self.clock.now();

        let question_id = match attempt.next_question_id(now) {
            Ok(question_id) => question_id,
            Err(err) => {
                self.persist_expiry_if_observed(&attempt).await;
                return Err(err);
            }
        };

        let visible = self.visible_questions(&descriptor).await?;
        let question = visible
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| {
                AppError::InternalError(format!(
                    "question '{}' missing from snapshot",
                    question_id
                ))
            })?;

        let options = if attempt.policy().shuffle_answers {
            shuffle::shuffle_options(&question.options, attempt.seed(), attempt.cursor())
        } else {
            question.options.clone()
        };

        // Records the armed per-question timer so a rehydrated attempt
        // keeps the original deadline.
        self.repository.save_progress(&attempt).await?;

        Ok(NextQuestionResponse {
            attempt: AttemptView::from_attempt(&attempt, now),
            question: QuestionView::new(question, options),
        })
    }

    pub async fn answer_current(
        &self,
        requester: Option<u64>,
        attempt_id: Uuid,
        expected_version: i64,
        payload: AnswerPayload,
    ) -> AppResult<(AttemptView, String)> {
        let mut attempt = self.repository.get_by_id(attempt_id).await?;
        self.access.can_modify_attempt(requester, &attempt)?;

        let now = self.clock.now();
        let (_, question_id) = match attempt.answer_current(expected_version, now, payload) {
            Ok(result) => result,
            Err(err) => {
                self.persist_expiry_if_observed(&attempt).await;
                return Err(err);
            }
        };

        self.repository.save_answer(&attempt, &question_id).await?;
        Ok((AttemptView::from_attempt(&attempt, now), question_id))
    }

    pub async fn submit(
        &self,
        requester: Option<u64>,
        attempt_id: Uuid,
        expected_version: i64,
    ) -> AppResult<AttemptView> {
        let mut attempt = self.repository.get_by_id(attempt_id).await?;
        self.access.can_modify_attempt(requester, &attempt)?;

        let descriptor = self
            .assignments
            .get_assignment(attempt.assignment_id())
            .await?;
        let questions = self.scoring_questions(&descriptor).await?;
        let outcome = scoring::score_attempt(&questions, &attempt.answers());

        let now = self.clock.now();
        attempt.submit(
            expected_version,
            now,
            outcome.score,
            outcome.max_score,
            outcome.pending_score,
        )?;
        self.repository.submit(&attempt).await?;
        log::info!(
            "Attempt {} submitted with score {}/{}",
            attempt.id(),
            outcome.score,
            outcome.max_score
        );
        Ok(AttemptView::from_attempt(&attempt, now))
    }

    pub async fn cancel(
        &self,
        requester: Option<u64>,
        attempt_id: Uuid,
        expected_version: i64,
    ) -> AppResult<AttemptView> {
        let mut attempt = self.repository.get_by_id(attempt_id).await?;
        self.access.can_modify_attempt(requester, &attempt)?;

        let now = self.clock.now();
        attempt.cancel(expected_version, now)?;
        self.repository.cancel(&attempt).await?;
        Ok(AttemptView::from_attempt(&attempt, now))
    }

    pub async fn list_assignment_attempts(
        &self,
        owner: u64,
        assignment_id: Uuid,
    ) -> AppResult<Vec<AttemptSummary>> {
        let descriptor = self.assignments.get_assignment(assignment_id).await?;
        if descriptor.owner_id != owner {
            return Err(AppError::Forbidden(
                "only the assignment owner may list attempts".to_string(),
            ));
        }
        let mut summaries = self
            .repository
            .list_summaries_by_assignments(&[assignment_id])
            .await?;

        let ids: Vec<u64> = {
            let mut ids: Vec<u64> = summaries
                .iter()
                .map(|s| s.user_id)
                .filter(|id| *id != 0)
                .collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        if !ids.is_empty() {
            let profiles = self.users.lookup(&ids).await?;
            for summary in &mut summaries {
                summary.user = profiles.get(&summary.user_id).cloned();
            }
        }
        Ok(summaries)
    }

    pub async fn attempt_details(
        &self,
        owner: u64,
        attempt_id: Uuid,
    ) -> AppResult<AttemptDetailsResponse> {
        let attempt = self.repository.get_by_id(attempt_id).await?;
        let descriptor = self
            .assignments
            .get_assignment(attempt.assignment_id())
            .await?;
        if descriptor.owner_id != owner {
            return Err(AppError::Forbidden(
                "only the assignment owner may view attempt details".to_string(),
            ));
        }

        let visible = self.visible_questions(&descriptor).await?;
        let questions = self.scoring_questions(&descriptor).await?;
        let (attempt_view, answers) = self
            .build_details(&attempt, &visible, &questions)
            .await?;
        Ok(AttemptDetailsResponse {
            attempt: attempt_view,
            answers,
        })
    }

    pub async fn grade_answer(
        &self,
        owner: u64,
        attempt_id: Uuid,
        question_id: &str,
        score: f64,
        is_correct: Option<bool>,
    ) -> AppResult<GradeAnswerResponse> {
        let mut attempt = self.repository.get_by_id(attempt_id).await?;
        let descriptor = self
            .assignments
            .get_assignment(attempt.assignment_id())
            .await?;
        if descriptor.owner_id != owner {
            return Err(AppError::Forbidden(
                "only the assignment owner may grade answers".to_string(),
            ));
        }

        let questions = self.scoring_questions(&descriptor).await?;
        let question = questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("question '{}' not part of this test", question_id))
            })?;
        if score > question.weight {
            return Err(AppError::Validation(format!(
                "score exceeds question weight {}",
                question.weight
            )));
        }

        // Prospective totals with the new grade applied.
        let mut answers = attempt.answers();
        let graded = answers.get_mut(question_id).ok_or_else(|| {
            AppError::NotFound(format!("no answer recorded for question '{}'", question_id))
        })?;
        graded.score = Some(score);
        graded.is_correct = is_correct;
        let totals = scoring::recompute_totals(&questions, &answers);

        attempt.grade_answer(
            question_id,
            score,
            is_correct,
            totals.score,
            totals.pending_score,
        )?;
        self.repository.save_grade(&attempt, question_id).await?;

        let participant = self.participant_for(&attempt).await?;
        Ok(GradeAnswerResponse {
            attempt: details_view(&attempt, participant),
        })
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    async fn effective_settings(
        &self,
        descriptor: &AssignmentDescriptor,
    ) -> AppResult<EffectiveSettings> {
        if let Some(template) = &descriptor.template {
            return Ok(EffectiveSettings {
                duration_sec: template.duration_sec,
                available_from: template.available_from,
                available_until: template.available_until,
                allow_guests: template.allow_guests,
                policy: template.policy.clone(),
            });
        }
        let settings = self.tests.get_test_settings(descriptor.test_id).await?;
        Ok(EffectiveSettings {
            duration_sec: settings.duration_sec,
            available_from: settings.available_from,
            available_until: settings.available_until,
            allow_guests: settings.allow_guests,
            policy: settings.policy,
        })
    }

    async fn visible_questions(
        &self,
        descriptor: &AssignmentDescriptor,
    ) -> AppResult<Vec<VisibleQuestion>> {
        if let Some(template) = &descriptor.template {
            return Ok(template.visible_questions());
        }
        self.tests.list_visible_questions(descriptor.test_id).await
    }

    async fn scoring_questions(
        &self,
        descriptor: &AssignmentDescriptor,
    ) -> AppResult<Vec<QuestionForScoring>> {
        if let Some(template) = &descriptor.template {
            return Ok(template.questions_for_scoring());
        }
        self.tests
            .list_questions_for_scoring(descriptor.test_id)
            .await
    }

    /// Best-effort persistence of an expiry observed mid-operation, so a
    /// reload cannot resurrect the attempt past its deadline.
    async fn persist_expiry_if_observed(&self, attempt: &Attempt) {
        if attempt.status() == crate::models::domain::attempt::AttemptStatus::Expired
            && attempt.expired_at().is_some()
        {
            if let Err(err) = self.repository.save_progress(attempt).await {
                log::warn!(
                    "Failed to persist expiry for attempt {}: {}",
                    attempt.id(),
                    err
                );
            }
        }
    }

    async fn participant_for(&self, attempt: &Attempt) -> AppResult<ParticipantView> {
        if attempt.user_id() != 0 {
            let profiles = self.users.lookup(&[attempt.user_id()]).await?;
            if let Some(info) = profiles.get(&attempt.user_id()) {
                return Ok(ParticipantView {
                    kind: "user".to_string(),
                    name: info.full_name(),
                    user_id: Some(info.id),
                });
            }
            return Ok(ParticipantView {
                kind: "user".to_string(),
                name: format!("User #{}", attempt.user_id()),
                user_id: Some(attempt.user_id()),
            });
        }
        let name = attempt
            .guest_name()
            .filter(|n| !n.is_empty())
            .unwrap_or("Guest");
        Ok(ParticipantView {
            kind: "guest".to_string(),
            name: name.to_string(),
            user_id: None,
        })
    }

    async fn build_details(
        &self,
        attempt: &Attempt,
        visible: &[VisibleQuestion],
        questions: &[QuestionForScoring],
    ) -> AppResult<(AttemptDetailsView, Vec<AnsweredQuestionView>)> {
        let participant = self.participant_for(attempt).await?;
        let by_id: HashMap<&str, &VisibleQuestion> =
            visible.iter().map(|q| (q.id.as_str(), q)).collect();
        let scoring_by_id: HashMap<&str, &QuestionForScoring> =
            questions.iter().map(|q| (q.id.as_str(), q)).collect();

        let answers = attempt.answers();
        let mut views = Vec::with_capacity(answers.len());
        // Walk the plan so answers appear in serve order.
        for question_id in attempt.plan() {
            let Some(answer) = answers.get(question_id) else {
                continue;
            };
            let Some(question) = by_id.get(question_id.as_str()).copied() else {
                continue;
            };
            let scoring_question = scoring_by_id.get(question_id.as_str()).copied();
            views.push(answered_question_view(question, scoring_question, answer));
        }
        Ok((details_view(attempt, participant), views))
    }
}

fn details_view(attempt: &Attempt, participant: ParticipantView) -> AttemptDetailsView {
    let (score, max_score) = attempt.score();
    AttemptDetailsView {
        attempt_id: attempt.id(),
        assignment_id: attempt.assignment_id(),
        test_id: attempt.test_id(),
        status: attempt.status(),
        started_at: attempt.started_at(),
        submitted_at: attempt.submitted_at(),
        expired_at: attempt.expired_at(),
        duration_sec: attempt.policy().max_attempt_time_sec.max(0),
        score,
        max_score,
        pending_score: attempt.pending_score(),
        participant,
    }
}

fn answered_question_view(
    question: &VisibleQuestion,
    scoring_question: Option<&QuestionForScoring>,
    answer: &Answer,
) -> AnsweredQuestionView {
    let selected: Vec<i64> = match &answer.payload {
        AnswerPayload::Single(selected) => vec![*selected],
        AnswerPayload::Multi(selected) => selected.clone(),
        _ => vec![],
    };
    let options: Vec<AnsweredOptionView> = question
        .options
        .iter()
        .enumerate()
        .map(|(index, option)| AnsweredOptionView {
            id: option.id.clone(),
            option_text: option.option_text.clone(),
            image_url: option.image_url.clone(),
            selected: selected.contains(&(index as i64)),
        })
        .collect();

    let auto_correct =
        scoring_question.and_then(|q| scoring::is_correct(q, &answer.payload));
    let weight = scoring_question.map(|q| q.weight).unwrap_or(1.0);
    let score = answer.score.or_else(|| {
        auto_correct.map(|correct| if correct { weight } else { 0.0 })
    });

    let (text_answer, code_answer) = match &answer.payload {
        AnswerPayload::Text(text) => (Some(text.clone()), None),
        AnswerPayload::Code(code) => (
            None,
            Some(CodeAnswerView {
                lang: code.lang.clone(),
                body: code.body.clone(),
            }),
        ),
        _ => (None, None),
    };

    AnsweredQuestionView {
        question_id: question.id.clone(),
        question_text: question.question_text.clone(),
        image_url: question.image_url.clone(),
        kind: question.kind,
        weight,
        options,
        text_answer,
        code_answer,
        is_correct: answer.is_correct.or(auto_correct),
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::assignment::{
        AssignmentTemplate, TemplateOption, TemplateQuestion,
    };
    use crate::models::domain::attempt::AttemptStatus;
    use crate::models::domain::question::QuestionKind;
    use crate::models::domain::user::UserInfo;
    use crate::repositories::attempt_repository::AttemptCounts;
    use crate::repositories::test_repository::TestSettings;
    use crate::services::access_policy::GuestAwarePolicy;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        pub AttemptRepo {}

        #[async_trait]
        impl AttemptRepository for AttemptRepo {
            async fn create(&self, attempt: &Attempt) -> AppResult<Uuid>;
            async fn get_by_id(&self, id: Uuid) -> AppResult<Attempt>;
            async fn get_active_by_user_and_assignment(
                &self,
                user_id: u64,
                assignment_id: Uuid,
            ) -> AppResult<Option<Attempt>>;
            async fn save_answer(&self, attempt: &Attempt, question_id: &str) -> AppResult<()>;
            async fn save_progress(&self, attempt: &Attempt) -> AppResult<()>;
            async fn submit(&self, attempt: &Attempt) -> AppResult<()>;
            async fn cancel(&self, attempt: &Attempt) -> AppResult<()>;
            async fn save_grade(&self, attempt: &Attempt, question_id: &str) -> AppResult<()>;
            async fn list_summaries_by_assignments(
                &self,
                assignment_ids: &[Uuid],
            ) -> AppResult<Vec<AttemptSummary>>;
            async fn count_attempts(&self, filter: &AttemptCountFilter) -> AppResult<AttemptCounts>;
        }
    }

    mock! {
        pub Assignments {}

        #[async_trait]
        impl AssignmentReadModel for Assignments {
            async fn get_assignment(&self, id: Uuid) -> AppResult<AssignmentDescriptor>;
        }
    }

    mock! {
        pub Tests {}

        #[async_trait]
        impl TestReadModel for Tests {
            async fn get_test_settings(&self, test_id: Uuid) -> AppResult<TestSettings>;
            async fn list_visible_questions(
                &self,
                test_id: Uuid,
            ) -> AppResult<Vec<VisibleQuestion>>;
            async fn list_questions_for_scoring(
                &self,
                test_id: Uuid,
            ) -> AppResult<Vec<QuestionForScoring>>;
        }
    }

    mock! {
        pub Users {}

        #[async_trait]
        impl UserDirectory for Users {
            async fn lookup(&self, ids: &[u64]) -> AppResult<HashMap<u64, UserInfo>>;
        }
    }

    struct FixedClock(DateTime<Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct FixedSeed(i64);
    impl SeedSource for FixedSeed {
        fn next_seed(&self) -> i64 {
            self.0
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn three_single_questions() -> Vec<TemplateQuestion> {
        (0..3)
            .map(|i| TemplateQuestion {
                id: format!("q{}", i + 1),
                kind: QuestionKind::Single,
                question_text: format!("Question {}", i + 1),
                image_url: None,
                weight: 1.0,
                correct_options: vec![1],
                options: vec![
                    TemplateOption {
                        id: format!("q{}o0", i + 1),
                        option_text: "wrong".to_string(),
                        image_url: None,
                    },
                    TemplateOption {
                        id: format!("q{}o1", i + 1),
                        option_text: "right".to_string(),
                        image_url: None,
                    },
                ],
            })
            .collect()
    }

    fn descriptor_with_template(
        assignment_id: Uuid,
        owner_id: u64,
        policy: AttemptPolicy,
        allow_guests: bool,
    ) -> AssignmentDescriptor {
        AssignmentDescriptor {
            id: assignment_id,
            test_id: Uuid::new_v4(),
            owner_id,
            title: "Midterm".to_string(),
            template: Some(AssignmentTemplate {
                title: "Midterm".to_string(),
                description: String::new(),
                duration_sec: 600,
                allow_guests,
                available_from: None,
                available_until: None,
                policy,
                questions: three_single_questions(),
            }),
        }
    }

    fn service(
        repo: MockAttemptRepo,
        assignments: MockAssignments,
        tests: MockTests,
        users: MockUsers,
    ) -> AttemptService {
        AttemptService::new(
            Arc::new(repo),
            Arc::new(assignments),
            Arc::new(tests),
            Arc::new(users),
            Arc::new(GuestAwarePolicy),
            Arc::new(FixedClock(t0())),
            Arc::new(FixedSeed(1234)),
        )
    }

    #[tokio::test]
    async fn test_start_attempt_builds_plan_and_persists() {
        let assignment_id = Uuid::new_v4();
        let mut repo = MockAttemptRepo::new();
        let mut assignments = MockAssignments::new();

        assignments
            .expect_get_assignment()
            .with(eq(assignment_id))
            .returning(move |id| {
                Ok(descriptor_with_template(
                    id,
                    1,
                    AttemptPolicy::default(),
                    true,
                ))
            });
        repo.expect_get_active_by_user_and_assignment()
            .returning(|_, _| Ok(None));
        repo.expect_create().returning(|attempt| Ok(attempt.id()));

        let svc = service(repo, assignments, MockTests::new(), MockUsers::new());
        let view = svc
            .start_attempt(Some(7), None, assignment_id, AttemptMetadata::default())
            .await
            .unwrap();

        assert_eq!(view.status, AttemptStatus::Active);
        assert_eq!(view.version, 0);
        assert_eq!(view.total, 3);
        assert_eq!(view.cursor, 0);
        // duration_sec backfills the attempt deadline.
        assert_eq!(view.policy.max_attempt_time_sec, 600);
        assert_eq!(view.time_left_sec, 600);
    }

    #[tokio::test]
    async fn test_start_attempt_is_idempotent_for_active_attempt() {
        let assignment_id = Uuid::new_v4();
        let existing = Attempt::new(
            assignment_id,
            Uuid::new_v4(),
            7,
            None,
            t0(),
            AttemptPolicy::default(),
            1,
            vec!["q1".to_string()],
            String::new(),
            String::new(),
        );
        let existing_id = existing.id();

        let mut repo = MockAttemptRepo::new();
        let mut assignments = MockAssignments::new();
        assignments.expect_get_assignment().returning(move |id| {
            Ok(descriptor_with_template(
                id,
                1,
                AttemptPolicy::default(),
                true,
            ))
        });
        let mut returned = Some(existing);
        repo.expect_get_active_by_user_and_assignment()
            .return_once(move |_, _| Ok(returned.take()));
        repo.expect_create().never();

        let svc = service(repo, assignments, MockTests::new(), MockUsers::new());
        let view = svc
            .start_attempt(Some(7), None, assignment_id, AttemptMetadata::default())
            .await
            .unwrap();
        assert_eq!(view.attempt_id, existing_id);
    }

    #[tokio::test]
    async fn test_start_attempt_guest_blocked() {
        let assignment_id = Uuid::new_v4();
        let mut assignments = MockAssignments::new();
        assignments.expect_get_assignment().returning(move |id| {
            Ok(descriptor_with_template(
                id,
                1,
                AttemptPolicy::default(),
                false,
            ))
        });

        let svc = service(
            MockAttemptRepo::new(),
            assignments,
            MockTests::new(),
            MockUsers::new(),
        );
        let err = svc
            .start_attempt(
                None,
                Some("G".to_string()),
                assignment_id,
                AttemptMetadata::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GuestsNotAllowed(_)));
    }

    #[tokio::test]
    async fn test_start_attempt_enforces_quota() {
        let assignment_id = Uuid::new_v4();
        let policy = AttemptPolicy {
            max_attempts: 3,
            ..AttemptPolicy::default()
        };
        let mut repo = MockAttemptRepo::new();
        let mut assignments = MockAssignments::new();
        assignments
            .expect_get_assignment()
            .returning(move |id| Ok(descriptor_with_template(id, 1, policy.clone(), true)));
        repo.expect_get_active_by_user_and_assignment()
            .returning(|_, _| Ok(None));
        repo.expect_count_attempts().returning(|_| {
            Ok(AttemptCounts {
                by_user: 3,
                ..AttemptCounts::default()
            })
        });
        repo.expect_create().never();

        let svc = service(repo, assignments, MockTests::new(), MockUsers::new());
        let err = svc
            .start_attempt(Some(7), None, assignment_id, AttemptMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MaxAttempts(_)));
    }

    #[tokio::test]
    async fn test_start_attempt_missing_dimension_never_blocks() {
        let assignment_id = Uuid::new_v4();
        let policy = AttemptPolicy {
            max_attempts: 1,
            ..AttemptPolicy::default()
        };
        let mut repo = MockAttemptRepo::new();
        let mut assignments = MockAssignments::new();
        assignments
            .expect_get_assignment()
            .returning(move |id| Ok(descriptor_with_template(id, 1, policy.clone(), true)));
        repo.expect_get_active_by_user_and_assignment()
            .returning(|_, _| Ok(None));
        // Guest/fingerprint/ip dimensions report zero because they were not
        // provided; only by_user could block and this requester is fresh.
        repo.expect_count_attempts()
            .returning(|_| Ok(AttemptCounts::default()));
        repo.expect_create().returning(|attempt| Ok(attempt.id()));

        let svc = service(repo, assignments, MockTests::new(), MockUsers::new());
        assert!(svc
            .start_attempt(Some(7), None, assignment_id, AttemptMetadata::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_start_attempt_respects_availability_window() {
        let assignment_id = Uuid::new_v4();
        let mut assignments = MockAssignments::new();
        assignments.expect_get_assignment().returning(move |id| {
            let mut descriptor =
                descriptor_with_template(id, 1, AttemptPolicy::default(), true);
            if let Some(template) = &mut descriptor.template {
                template.available_from = Some(t0() + chrono::Duration::hours(1));
            }
            Ok(descriptor)
        });

        let svc = service(
            MockAttemptRepo::new(),
            assignments,
            MockTests::new(),
            MockUsers::new(),
        );
        let err = svc
            .start_attempt(Some(7), None, assignment_id, AttemptMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_shuffled_plan_is_deterministic_for_seed() {
        let assignment_id = Uuid::new_v4();
        let policy = AttemptPolicy {
            shuffle_questions: true,
            ..AttemptPolicy::default()
        };

        let run = |captured: Arc<std::sync::Mutex<Vec<Vec<String>>>>| {
            let mut repo = MockAttemptRepo::new();
            let mut assignments = MockAssignments::new();
            let policy = policy.clone();
            assignments
                .expect_get_assignment()
                .returning(move |id| Ok(descriptor_with_template(id, 1, policy.clone(), true)));
            repo.expect_get_active_by_user_and_assignment()
                .returning(|_, _| Ok(None));
            repo.expect_create().returning(move |attempt| {
                captured.lock().unwrap().push(attempt.plan().to_vec());
                Ok(attempt.id())
            });
            service(repo, assignments, MockTests::new(), MockUsers::new())
        };

        let plans = Arc::new(std::sync::Mutex::new(Vec::new()));
        for _ in 0..2 {
            let svc = run(plans.clone());
            svc.start_attempt(Some(7), None, assignment_id, AttemptMetadata::default())
                .await
                .unwrap();
        }
        let plans = plans.lock().unwrap();
        // Same fixed clock and seed source, so both runs derive the same
        // seed and the same permutation.
        assert_eq!(plans[0], plans[1]);
        let mut sorted = plans[0].clone();
        sorted.sort();
        assert_eq!(sorted, vec!["q1", "q2", "q3"]);
    }

    #[tokio::test]
    async fn test_submit_scores_against_template() {
        let assignment_id = Uuid::new_v4();
        let mut attempt = Attempt::new(
            assignment_id,
            Uuid::new_v4(),
            7,
            None,
            t0(),
            AttemptPolicy::default(),
            1,
            vec!["q1".to_string(), "q2".to_string(), "q3".to_string()],
            String::new(),
            String::new(),
        );
        attempt
            .answer_current(0, t0(), AnswerPayload::Single(1))
            .unwrap();
        attempt
            .answer_current(1, t0(), AnswerPayload::Single(0))
            .unwrap();

        let mut repo = MockAttemptRepo::new();
        let mut assignments = MockAssignments::new();
        assignments.expect_get_assignment().returning(move |id| {
            Ok(descriptor_with_template(
                id,
                1,
                AttemptPolicy::default(),
                true,
            ))
        });
        let mut stored = Some(attempt);
        repo.expect_get_by_id()
            .return_once(move |_| Ok(stored.take().unwrap()));
        repo.expect_submit().returning(|attempt| {
            let (score, max_score) = attempt.score();
            assert_eq!(score, 1.0);
            assert_eq!(max_score, 3.0);
            Ok(())
        });

        let svc = service(repo, assignments, MockTests::new(), MockUsers::new());
        let view = svc
            .submit(Some(7), Uuid::new_v4(), 2)
            .await
            .unwrap();
        assert_eq!(view.status, AttemptStatus::Submitted);
        assert_eq!(view.version, 3);
    }

    #[tokio::test]
    async fn test_list_attempts_requires_ownership() {
        let assignment_id = Uuid::new_v4();
        let mut assignments = MockAssignments::new();
        assignments.expect_get_assignment().returning(move |id| {
            Ok(descriptor_with_template(
                id,
                1,
                AttemptPolicy::default(),
                true,
            ))
        });

        let svc = service(
            MockAttemptRepo::new(),
            assignments,
            MockTests::new(),
            MockUsers::new(),
        );
        let err = svc
            .list_assignment_attempts(99, assignment_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_grade_answer_recomputes_totals() {
        let assignment_id = Uuid::new_v4();
        let owner = 1u64;

        // Template with one auto-scored and one text question.
        let template_questions = vec![
            TemplateQuestion {
                id: "q1".to_string(),
                kind: QuestionKind::Single,
                question_text: "pick".to_string(),
                image_url: None,
                weight: 1.0,
                correct_options: vec![1],
                options: vec![],
            },
            TemplateQuestion {
                id: "q2".to_string(),
                kind: QuestionKind::Text,
                question_text: "write".to_string(),
                image_url: None,
                weight: 2.0,
                correct_options: vec![],
                options: vec![],
            },
        ];

        let mut attempt = Attempt::new(
            assignment_id,
            Uuid::new_v4(),
            7,
            None,
            t0(),
            AttemptPolicy::default(),
            1,
            vec!["q1".to_string(), "q2".to_string()],
            String::new(),
            String::new(),
        );
        attempt
            .answer_current(0, t0(), AnswerPayload::Single(1))
            .unwrap();
        attempt
            .answer_current(1, t0(), AnswerPayload::Text("essay".into()))
            .unwrap();
        attempt.submit(2, t0(), 1.0, 3.0, 2.0).unwrap();

        let mut repo = MockAttemptRepo::new();
        let mut assignments = MockAssignments::new();
        assignments.expect_get_assignment().returning(move |id| {
            Ok(AssignmentDescriptor {
                id,
                test_id: Uuid::new_v4(),
                owner_id: owner,
                title: String::new(),
                template: Some(AssignmentTemplate {
                    title: String::new(),
                    description: String::new(),
                    duration_sec: 0,
                    allow_guests: true,
                    available_from: None,
                    available_until: None,
                    policy: AttemptPolicy::default(),
                    questions: template_questions.clone(),
                }),
            })
        });
        let mut stored = Some(attempt);
        repo.expect_get_by_id()
            .return_once(move |_| Ok(stored.take().unwrap()));
        repo.expect_save_grade().returning(|attempt, question_id| {
            assert_eq!(question_id, "q2");
            let (score, _) = attempt.score();
            assert_eq!(score, 2.5);
            assert_eq!(attempt.pending_score(), 0.0);
            Ok(())
        });
        let mut users = MockUsers::new();
        users.expect_lookup().returning(|_| Ok(HashMap::new()));

        let svc = service(repo, assignments, MockTests::new(), users);
        let response = svc
            .grade_answer(owner, Uuid::new_v4(), "q2", 1.5, Some(true))
            .await
            .unwrap();
        assert_eq!(response.attempt.score, 2.5);
        assert_eq!(response.attempt.pending_score, 0.0);
    }
}
