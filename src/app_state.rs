use std::sync::Arc;

use crate::{
    auth::JwtService,
    config::Config,
    db::Database,
    errors::AppResult,
    repositories::{
        MongoAssignmentReadModel, MongoAttemptRepository, MongoTestReadModel, MongoUserDirectory,
    },
    services::{
        AttemptService, GuestAwarePolicy, SystemClock, ThreadRngSeedSource,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub attempt_service: Arc<AttemptService>,
    pub jwt_service: Arc<JwtService>,
    pub config: Arc<Config>,
    pub db: Database,
}

impl AppState {
    pub async fn new(config: Config) -> AppResult<Self> {
        let db = Database::connect(&config).await?;

        let attempt_repository = Arc::new(MongoAttemptRepository::new(&db));
        attempt_repository.ensure_indexes().await?;

        let assignment_read_model = Arc::new(MongoAssignmentReadModel::new(&db));
        assignment_read_model.ensure_indexes().await?;

        let test_read_model = Arc::new(MongoTestReadModel::new(&db));
        test_read_model.ensure_indexes().await?;

        let user_directory = Arc::new(MongoUserDirectory::new(&db));

        let attempt_service = Arc::new(AttemptService::new(
            attempt_repository,
            assignment_read_model,
            test_read_model,
            user_directory,
            Arc::new(GuestAwarePolicy),
            Arc::new(SystemClock),
            Arc::new(ThreadRngSeedSource),
        ));

        let jwt_service = Arc::new(JwtService::new(&config.jwt_secret));

        Ok(Self {
            attempt_service,
            jwt_service,
            config: Arc::new(config),
            db,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_cloneable() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
