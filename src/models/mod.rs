//! Data models for nova.

mod problem;
mod question;
mod user;

pub use problem::{PROBLEM_JSON, ProblemDetails};
pub use question::{
    QuestionAnswer, QuestionEssay, QuestionJudgement, QuestionKind, QuestionMultipleChoice,
    QuestionRecord, QuestionSingleChoice,
};
pub use user::{User, UserName, UserPatch, validate_id};
