use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use thiserror::Error;

use super::persistence::LocalDrafts;
use super::state::{ExamInfo, ExamSession};
use super::SessionConfig;
use crate::api::client::ExamBackend;
use crate::api::endpoints::is_plain_id;
use crate::api::errors::ApiError;
use crate::core::time::format_epoch_millis;
use crate::domain::answer::{AnswerStore, AnswerValue};
use crate::domain::draft::merge_answers;
use crate::domain::question::Question;
use crate::schemas::exam::{RawAttempt, RawExam};

const CANNOT_START_DEFAULT: &str = "Could not start this exam.";

/// Why a session could not be opened. Always fatal for the page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("no exam id supplied")]
    MissingExamId,
    #[error("exam not found")]
    ExamNotFound,
    #[error("attempt could not be started: {0}")]
    CannotStart(String),
    #[error("exam has no questions")]
    NoQuestions,
    #[error("connection failed: {0}")]
    Connection(String),
}

impl LoadError {
    pub fn title(&self) -> &'static str {
        match self {
            Self::MissingExamId => "Missing exam ID",
            Self::ExamNotFound => "Exam Not Found",
            Self::CannotStart(_) => "Cannot Start Exam",
            Self::NoQuestions => "No Questions",
            Self::Connection(_) => "Connection Error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::MissingExamId => "No exam was specified. Please go back and try again.".to_string(),
            Self::ExamNotFound => {
                "This exam could not be loaded. It may have ended or does not exist.".to_string()
            }
            Self::CannotStart(message) => message.clone(),
            Self::NoQuestions => "This exam has no questions assigned yet.".to_string(),
            Self::Connection(_) => {
                "Failed to connect to the server. Please check your network and try again."
                    .to_string()
            }
        }
    }
}

/// Fetches the exam, resumes or creates the attempt and reconciles saved answers with
/// the local draft.
pub async fn load_session(
    backend: &dyn ExamBackend,
    drafts: &LocalDrafts,
    exam_id: &str,
    attempt_id: Option<&str>,
    config: &SessionConfig,
) -> Result<ExamSession, LoadError> {
    if exam_id.trim().is_empty() {
        return Err(LoadError::MissingExamId);
    }
    if !is_plain_id(exam_id) {
        tracing::error!(exam_id, "Exam id is not a plain token");
        return Err(LoadError::ExamNotFound);
    }

    let exam_data = backend.fetch_exam(exam_id).await.map_err(|err| match err {
        ApiError::Network(detail) => LoadError::Connection(detail),
        other => {
            tracing::error!(exam_id, error = %other, "Exam detail request failed");
            LoadError::ExamNotFound
        }
    })?;
    if exam_data.is_null() {
        return Err(LoadError::ExamNotFound);
    }
    let raw_exam: RawExam = serde_json::from_value(exam_data).map_err(|err| {
        tracing::error!(exam_id, error = %err, "Exam detail response unreadable");
        LoadError::ExamNotFound
    })?;

    let attempt_result = match attempt_id {
        Some(_) => backend.resume_attempt(exam_id).await,
        None => backend.create_attempt(exam_id).await,
    };
    let attempt_data = attempt_result.map_err(|err| match err {
        ApiError::Network(detail) => LoadError::Connection(detail),
        other => {
            tracing::error!(exam_id, error = %other, "Attempt request failed");
            LoadError::CannotStart(other.message().unwrap_or_else(|| CANNOT_START_DEFAULT.to_string()))
        }
    })?;
    if attempt_data.is_null() {
        return Err(LoadError::CannotStart(CANNOT_START_DEFAULT.to_string()));
    }
    let mut raw_attempt: RawAttempt = serde_json::from_value(attempt_data).map_err(|err| {
        tracing::error!(exam_id, error = %err, "Attempt response unreadable");
        LoadError::CannotStart(CANNOT_START_DEFAULT.to_string())
    })?;

    let resolved_attempt = raw_attempt
        .resolved_id()
        .or_else(|| attempt_id.map(ToString::to_string))
        .ok_or_else(|| LoadError::CannotStart(CANNOT_START_DEFAULT.to_string()))?;
    if !is_plain_id(&resolved_attempt) {
        tracing::error!(exam_id, attempt_id = %resolved_attempt, "Attempt id is not a plain token");
        return Err(LoadError::CannotStart(CANNOT_START_DEFAULT.to_string()));
    }

    let questions: Vec<Question> =
        raw_attempt.take_questions().into_iter().filter_map(Question::from_raw).collect();
    if questions.is_empty() {
        return Err(LoadError::NoQuestions);
    }

    let remaining = initial_remaining(&raw_attempt, &raw_exam, config.default_time_seconds);

    let server_answers: BTreeMap<String, Value> = raw_attempt
        .take_saved_answers()
        .into_iter()
        .filter_map(|saved| saved.into_entry())
        .filter(|(_, value)| !is_blank_answer(value))
        .collect();

    let draft = drafts.load().filter(|draft| {
        let current = draft.belongs_to(&resolved_attempt);
        if !current {
            tracing::warn!(
                exam_id,
                draft_attempt = ?draft.attempt_id,
                attempt_id = %resolved_attempt,
                "Discarding local draft from another attempt"
            );
            drafts.clear();
        }
        current
    });
    if let Some(draft) = &draft {
        tracing::info!(
            exam_id,
            saved_at = %format_epoch_millis(draft.saved_at),
            answers = draft.answers.len(),
            "Restoring local draft"
        );
    }
    let local_answers = draft.as_ref().map(|draft| draft.answers.clone()).unwrap_or_default();
    let merged = merge_answers(&server_answers, &local_answers, config.draft_precedence);

    let values: BTreeMap<String, AnswerValue> = questions
        .iter()
        .filter_map(|question| {
            let raw = merged.get(&question.id)?;
            AnswerValue::from_json(question.shape(), raw).map(|value| (question.id.clone(), value))
        })
        .collect();

    let known: BTreeSet<&str> = questions.iter().map(|question| question.id.as_str()).collect();
    let flagged: BTreeSet<String> = raw_attempt
        .flagged
        .take()
        .unwrap_or_default()
        .into_iter()
        .chain(draft.map(|draft| draft.flagged).unwrap_or_default())
        .filter(|id| known.contains(id.as_str()))
        .collect();

    let exam = ExamInfo {
        id: raw_exam.id.unwrap_or_else(|| exam_id.to_string()),
        title: raw_exam.title.filter(|title| !title.trim().is_empty()).unwrap_or_else(|| "Exam".to_string()),
        duration_minutes: raw_exam.duration.filter(|minutes| *minutes > 0.0),
        total_marks: raw_exam.total_marks,
        exam_type: raw_exam.exam_type,
    };

    tracing::info!(
        exam_id,
        attempt_id = %resolved_attempt,
        questions = questions.len(),
        restored = values.len(),
        remaining_seconds = remaining,
        "Exam session loaded"
    );

    Ok(ExamSession::new(
        exam,
        resolved_attempt,
        questions,
        AnswerStore::from_parts(values, flagged),
        remaining,
    ))
}

/// Saves always carry every question, so empty server values are gaps, not answers.
fn is_blank_answer(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => match fields.get("code") {
            Some(code) => code.as_str().map_or(true, |code| code.trim().is_empty()),
            None => fields.is_empty(),
        },
        _ => false,
    }
}

/// Attempt time, then attempt duration, then the exam's declared minutes, then the default.
fn initial_remaining(attempt: &RawAttempt, exam: &RawExam, default_seconds: u64) -> u64 {
    let seconds = attempt
        .time_remaining_seconds
        .or(attempt.duration_seconds)
        .or_else(|| exam.duration.filter(|minutes| *minutes > 0.0).map(|minutes| minutes * 60.0));
    match seconds {
        Some(seconds) if seconds.is_finite() => seconds.max(0.0).floor() as u64,
        _ => default_seconds,
    }
}
