use thiserror::Error;

/// Rejected intent against the answer store or the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("unknown question {0}")]
    UnknownQuestion(String),
    #[error("question {question_id} expects a {expected} answer")]
    ShapeMismatch { question_id: String, expected: &'static str },
    #[error("question {question_id} has no option {option_id}")]
    UnknownOption { question_id: String, option_id: String },
    #[error("answers are locked once submission has started")]
    Locked,
    #[error("question index {index} is out of range (0..{len})")]
    OutOfRange { index: usize, len: usize },
}

/// Local draft storage failure. Logged and counted, never shown to the student.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("draft storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("draft storage quota exceeded ({needed} bytes, {available} available)")]
    QuotaExceeded { needed: usize, available: usize },
    #[error("draft could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("draft storage unavailable: {0}")]
    Unavailable(String),
}
