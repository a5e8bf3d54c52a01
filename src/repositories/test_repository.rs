use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::{bson::doc, options::IndexOptions, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::Database,
    errors::{AppError, AppResult},
    models::domain::assignment::{scoring_projection, visible_projection, TemplateQuestion},
    models::domain::policy::AttemptPolicy,
    models::domain::question::{QuestionForScoring, VisibleQuestion},
};

#[derive(Clone, Debug)]
pub struct TestSettings {
    pub duration_sec: i64,
    pub available_from: Option<DateTime<Utc>>,
    pub available_until: Option<DateTime<Utc>>,
    pub allow_guests: bool,
    pub policy: AttemptPolicy,
}

/// Read-side view of the live test, consulted only for assignments created
/// before template snapshots existed. Test authoring is out of scope.
#[async_trait]
pub trait TestReadModel: Send + Sync {
    async fn get_test_settings(&self, test_id: Uuid) -> AppResult<TestSettings>;
    async fn list_visible_questions(&self, test_id: Uuid) -> AppResult<Vec<VisibleQuestion>>;
    async fn list_questions_for_scoring(
        &self,
        test_id: Uuid,
    ) -> AppResult<Vec<QuestionForScoring>>;
}

#[derive(Debug, Deserialize, Serialize)]
struct TestRow {
    id: String,
    #[serde(default)]
    duration_sec: i64,
    #[serde(default)]
    allow_guests: bool,
    #[serde(default)]
    available_from: Option<DateTime<Utc>>,
    #[serde(default)]
    available_until: Option<DateTime<Utc>>,
    #[serde(default)]
    policy: AttemptPolicy,
    #[serde(default)]
    questions: Vec<TemplateQuestion>,
}

pub struct MongoTestReadModel {
    collection: Collection<TestRow>,
}

impl MongoTestReadModel {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.get_collection("tests"),
        }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        let id_index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("id_unique".to_string())
                    .build(),
            )
            .build();
        self.collection.create_index(id_index).await?;
        Ok(())
    }

    async fn load(&self, test_id: Uuid) -> AppResult<TestRow> {
        self.collection
            .find_one(doc! { "id": test_id.to_string() })
            .await?
            .ok_or_else(|| AppError::NotFound(format!("test '{}' not found", test_id)))
    }
}

#[async_trait]
impl TestReadModel for MongoTestReadModel {
    async fn get_test_settings(&self, test_id: Uuid) -> AppResult<TestSettings> {
        let row = self.load(test_id).await?;
        Ok(TestSettings {
            duration_sec: row.duration_sec,
            available_from: row.available_from,
            available_until: row.available_until,
            allow_guests: row.allow_guests,
            policy: row.policy,
        })
    }

    async fn list_visible_questions(&self, test_id: Uuid) -> AppResult<Vec<VisibleQuestion>> {
        let row = self.load(test_id).await?;
        Ok(visible_projection(&row.questions))
    }

    async fn list_questions_for_scoring(
        &self,
        test_id: Uuid,
    ) -> AppResult<Vec<QuestionForScoring>> {
        let row = self.load(test_id).await?;
        Ok(scoring_projection(&row.questions))
    }
}
