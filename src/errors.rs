use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// The attempt is past its deadline or already terminal.
    #[error("Attempt closed: {0}")]
    Closed(String),

    #[error("Version mismatch: {0}")]
    VersionMismatch(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No more questions")]
    NoMoreQuestions,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Guests not allowed: {0}")]
    GuestsNotAllowed(String),

    #[error("Assignment not found: {0}")]
    AssignmentNotFound(String),

    #[error("Max attempts reached: {0}")]
    MaxAttempts(String),

    #[error("Question time limit exceeded: {0}")]
    QuestionTimeLimit(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Stable machine-readable token carried in every error body.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Closed(_) => "attempt_closed",
            AppError::VersionMismatch(_) => "version_mismatch",
            AppError::InvalidState(_) => "invalid_state",
            AppError::Validation(_) => "invalid",
            AppError::NoMoreQuestions => "no_more_questions",
            AppError::Forbidden(_) => "forbidden",
            AppError::GuestsNotAllowed(_) => "guests_not_allowed",
            AppError::AssignmentNotFound(_) => "assignment_not_found",
            AppError::MaxAttempts(_) => "max_attempts",
            AppError::QuestionTimeLimit(_) => "question_time_limit",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::DatabaseError(_) => "database_error",
            AppError::InternalError(_) => "internal",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Closed(_) | AppError::QuestionTimeLimit(_) => StatusCode::GONE,
            AppError::VersionMismatch(_) => StatusCode::CONFLICT,
            AppError::InvalidState(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            // Handlers intercept NoMoreQuestions and answer 200 {done:true};
            // this mapping only applies if one leaks through.
            AppError::NoMoreQuestions => StatusCode::OK,
            AppError::Forbidden(_) | AppError::GuestsNotAllowed(_) => StatusCode::FORBIDDEN,
            AppError::AssignmentNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MaxAttempts(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::DatabaseError(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: ErrorBody {
                code: self.error_code().to_string(),
                message: self.to_string(),
            },
        })
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for AppError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        AppError::InternalError(format!("BSON serialization error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
