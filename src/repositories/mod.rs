pub mod assignment_repository;
pub mod attempt_repository;
pub mod test_repository;
pub mod user_directory;

pub use assignment_repository::{AssignmentReadModel, MongoAssignmentReadModel};
pub use attempt_repository::{
    AttemptCountFilter, AttemptCounts, AttemptRepository, MongoAttemptRepository,
};
pub use test_repository::{MongoTestReadModel, TestReadModel, TestSettings};
pub use user_directory::{MongoUserDirectory, UserDirectory};
