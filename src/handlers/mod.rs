pub mod attempt_handler;

pub use attempt_handler::{
    answer, attempt_details, cancel, grade_answer, health_check, list_attempts, next_question,
    start_attempt, submit,
};
