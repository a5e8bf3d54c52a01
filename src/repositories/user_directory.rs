use std::collections::HashMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, Collection};
use serde::{Deserialize, Serialize};

use crate::{db::Database, errors::AppResult, models::domain::user::UserInfo};

/// Batch id → profile lookup used to label attempts in owner views.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, ids: &[u64]) -> AppResult<HashMap<u64, UserInfo>>;
}

#[derive(Debug, Deserialize, Serialize)]
struct UserRow {
    id: i64,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

pub struct MongoUserDirectory {
    collection: Collection<UserRow>,
}

impl MongoUserDirectory {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.get_collection("users"),
        }
    }
}

#[async_trait]
impl UserDirectory for MongoUserDirectory {
    async fn lookup(&self, ids: &[u64]) -> AppResult<HashMap<u64, UserInfo>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let id_list: Vec<i64> = ids.iter().map(|id| *id as i64).collect();
        let rows: Vec<UserRow> = self
            .collection
            .find(doc! { "id": { "$in": id_list } })
            .await?
            .try_collect()
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let id = row.id.max(0) as u64;
                (
                    id,
                    UserInfo {
                        id,
                        first_name: row.first_name,
                        last_name: row.last_name,
                    },
                )
            })
            .collect())
    }
}
