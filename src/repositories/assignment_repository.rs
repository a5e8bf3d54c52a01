use async_trait::async_trait;
use mongodb::{bson::doc, options::IndexOptions, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::Database,
    errors::{AppError, AppResult},
    models::domain::assignment::{AssignmentDescriptor, AssignmentTemplate},
};

/// Read-side view of assignments. Assignment authoring lives elsewhere;
/// the attempt core only ever reads the descriptor and its snapshot.
#[async_trait]
pub trait AssignmentReadModel: Send + Sync {
    async fn get_assignment(&self, id: Uuid) -> AppResult<AssignmentDescriptor>;
}

#[derive(Debug, Deserialize, Serialize)]
struct AssignmentRow {
    id: String,
    test_id: String,
    owner_id: i64,
    #[serde(default)]
    title: String,
    /// Template snapshot captured at assignment creation; absent for
    /// assignments that predate snapshotting.
    #[serde(default)]
    template: Option<AssignmentTemplate>,
}

pub struct MongoAssignmentReadModel {
    collection: Collection<AssignmentRow>,
}

impl MongoAssignmentReadModel {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.get_collection("assignments"),
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
}

#[async_trait]
impl AssignmentReadModel for MongoAssignmentReadModel {
    async fn get_assignment(&self, id: Uuid) -> AppResult<AssignmentDescriptor> {
        let row = self
            .collection
            .find_one(doc! { "id": id.to_string() })
            .await?
            .ok_or_else(|| {
                AppError::AssignmentNotFound(format!("assignment '{}' not found", id))
            })?;

        let parse_id = |field: &str, value: &str| {
            Uuid::parse_str(value).map_err(|e| {
                AppError::DatabaseError(format!("bad {} in assignment row: {}", field, e))
            })
        };
        Ok(AssignmentDescriptor {
            id: parse_id("id", &row.id)?,
            test_id: parse_id("test_id", &row.test_id)?,
            owner_id: row.owner_id.max(0) as u64,
            title: row.title,
            template: row.template,
        })
    }
}
