use serde::Serialize;
use serde_json::Value;

/// Body of both the autosave and the final submit request; only `is_final` differs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitPayload {
    pub attempt_id: String,
    pub answers: Vec<AnswerPayload>,
    pub flagged: Vec<String>,
    pub is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_taken: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerPayload {
    pub question_id: String,
    pub answer: Value,
}

impl SubmitPayload {
    pub fn answer_for(&self, question_id: &str) -> Option<&Value> {
        self.answers.iter().find(|entry| entry.question_id == question_id).map(|entry| &entry.answer)
    }
}
