pub mod answer;
pub mod assignment;
pub mod attempt;
pub mod policy;
pub mod question;
pub mod user;

pub use answer::{Answer, AnswerKind, AnswerPayload, CodePayload};
pub use assignment::{AssignmentDescriptor, AssignmentTemplate, TemplateOption, TemplateQuestion};
pub use attempt::{Attempt, AttemptSnapshot, AttemptStatus, AttemptSummary};
pub use policy::{AttemptPolicy, ScoreRevealMode};
pub use question::{QuestionForScoring, QuestionKind, VisibleOption, VisibleQuestion};
pub use user::UserInfo;
