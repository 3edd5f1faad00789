use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify, OwnedMutexGuard};

use crate::api::client::ExamBackend;
use crate::api::errors::ApiError;
use crate::domain::answer::AnswerStore;
use crate::domain::question::Question;
use crate::schemas::exam::RawQuestion;
use crate::schemas::payload::SubmitPayload;
use crate::session::events::SessionEvent;
use crate::session::state::{ExamInfo, ExamSession};

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<AsyncMutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(AsyncMutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("TESTVERSE_") {
            std::env::remove_var(key);
        }
    }
}

pub(crate) fn exam_json() -> Value {
    json!({"id": 42, "title": "Midterm", "duration": 60, "total_marks": 10, "exam_type": "quiz"})
}

pub(crate) fn attempt_json(remaining: u64) -> Value {
    json!({
        "attempt_id": "a-1",
        "time_remaining_seconds": remaining,
        "questions": [
            {
                "id": "q1",
                "type": "mcq",
                "text": "Pick one",
                "points": 2,
                "section": "General",
                "options": [{"id": "o1", "text": "First"}, {"id": "o2", "text": "Second"}]
            },
            {
                "id": "q2",
                "type": "multiple_mcq",
                "text": "Pick colours",
                "points": 3,
                "section": "General",
                "options": ["red", "green", "blue"]
            },
            {
                "id": "q3",
                "type": "coding",
                "text": "Reverse a string",
                "points": 5,
                "section": "Coding",
                "allowed_languages": ["python", "rust"],
                "starter_code": "# write your solution\n"
            }
        ]
    })
}

pub(crate) fn sample_session(remaining: u64) -> ExamSession {
    let questions = attempt_json(remaining)["questions"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|raw| serde_json::from_value::<RawQuestion>(raw).ok())
        .filter_map(Question::from_raw)
        .collect();
    let exam = ExamInfo {
        id: "42".to_string(),
        title: "Midterm".to_string(),
        duration_minutes: Some(60.0),
        total_marks: Some(10.0),
        exam_type: Some("quiz".to_string()),
    };
    ExamSession::new(exam, "a-1".to_string(), questions, AnswerStore::new(), remaining)
}

/// Everything received so far, without waiting.
pub(crate) fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

struct FakeState {
    calls: Vec<&'static str>,
    exam: Result<Value, ApiError>,
    attempt: Result<Value, ApiError>,
    saved_answers: Vec<Value>,
    network_down: bool,
    save_error: Option<ApiError>,
    save_delay: Option<Duration>,
    submit_error: Option<ApiError>,
    saves: Vec<SubmitPayload>,
    submits: Vec<SubmitPayload>,
}

/// Scripted backend. Responses default to `exam_json()` and `attempt_json(120)`.
#[derive(Clone)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
    submit_gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                calls: Vec::new(),
                exam: Ok(exam_json()),
                attempt: Ok(attempt_json(120)),
                saved_answers: Vec::new(),
                network_down: false,
                save_error: None,
                save_delay: None,
                submit_error: None,
                saves: Vec::new(),
                submits: Vec::new(),
            })),
            submit_gate: Arc::new(Mutex::new(None)),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub(crate) fn set_exam_response(&self, response: Result<Value, ApiError>) {
        self.state().exam = response;
    }

    pub(crate) fn set_attempt_response(&self, response: Result<Value, ApiError>) {
        self.state().attempt = response;
    }

    pub(crate) fn set_saved_answers(&self, answers: Vec<Value>) {
        self.state().saved_answers = answers;
    }

    pub(crate) fn set_network_down(&self, down: bool) {
        self.state().network_down = down;
    }

    pub(crate) fn set_save_error(&self, error: Option<ApiError>) {
        self.state().save_error = error;
    }

    pub(crate) fn set_save_delay(&self, delay: Option<Duration>) {
        self.state().save_delay = delay;
    }

    pub(crate) fn set_submit_error(&self, error: Option<ApiError>) {
        self.state().submit_error = error;
    }

    /// Holds every submit until the returned handle is notified.
    pub(crate) fn hold_submits(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.submit_gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(gate.clone());
        gate
    }

    pub(crate) fn saves(&self) -> Vec<SubmitPayload> {
        self.state().saves.clone()
    }

    pub(crate) fn submits(&self) -> Vec<SubmitPayload> {
        self.state().submits.clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|recorded| **recorded == call).count()
    }

    fn record(&self, call: &'static str) -> Result<(), ApiError> {
        let mut state = self.state();
        state.calls.push(call);
        if state.network_down {
            return Err(ApiError::Network("connection refused".to_string()));
        }
        Ok(())
    }

    fn attempt_with_answers(&self) -> Result<Value, ApiError> {
        let state = self.state();
        let mut attempt = state.attempt.clone()?;
        // Like the real server, a resumed attempt carries whatever was saved last.
        let saved: Vec<Value> = if state.saved_answers.is_empty() {
            state
                .saves
                .last()
                .map(|payload| {
                    payload
                        .answers
                        .iter()
                        .map(|entry| json!({"question_id": entry.question_id, "answer": entry.answer}))
                        .collect()
                })
                .unwrap_or_default()
        } else {
            state.saved_answers.clone()
        };
        if !saved.is_empty() {
            if let Some(object) = attempt.as_object_mut() {
                object.insert("saved_answers".to_string(), Value::Array(saved));
            }
        }
        Ok(attempt)
    }
}

#[async_trait]
impl ExamBackend for FakeBackend {
    async fn fetch_exam(&self, _exam_id: &str) -> Result<Value, ApiError> {
        self.record("fetch_exam")?;
        self.state().exam.clone()
    }

    async fn resume_attempt(&self, _exam_id: &str) -> Result<Value, ApiError> {
        self.record("resume_attempt")?;
        self.attempt_with_answers()
    }

    async fn create_attempt(&self, _exam_id: &str) -> Result<Value, ApiError> {
        self.record("create_attempt")?;
        self.attempt_with_answers()
    }

    async fn save_answers(&self, _exam_id: &str, payload: &SubmitPayload) -> Result<Value, ApiError> {
        self.record("save_answers")?;
        let delay = self.state().save_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.saves.push(payload.clone());
        match state.save_error.clone() {
            Some(err) => Err(err),
            None => Ok(json!({"saved": payload.answers.len()})),
        }
    }

    async fn submit_answers(&self, _exam_id: &str, payload: &SubmitPayload) -> Result<Value, ApiError> {
        self.record("submit_answers")?;
        self.state().submits.push(payload.clone());
        let gate = self.submit_gate.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.state().submit_error.clone() {
            Some(err) => Err(err),
            None => Ok(json!({"status": "submitted"})),
        }
    }
}

pub(crate) fn answers_of(payload: &SubmitPayload) -> BTreeMap<String, Value> {
    payload.answers.iter().map(|entry| (entry.question_id.clone(), entry.answer.clone())).collect()
}
