use std::sync::Arc;

use crate::domain::draft::{draft_key, Draft, DraftStore};

/// Indicator shown next to the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saving,
    Saved,
    Failed,
    Local,
}

impl SaveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Failed => "failed",
            Self::Local => "local",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Saving => "Saving…",
            Self::Saved => "Saved",
            Self::Failed => "Save failed",
            Self::Local => "Saved locally",
        }
    }
}

/// Result of one server save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Failed,
    /// Known offline; only the local draft was written.
    Offline,
    /// Another save was in flight or the session is already submitting.
    Skipped,
}

/// Exam-scoped access to the draft store. Every failure is logged and swallowed.
#[derive(Clone)]
pub struct LocalDrafts {
    store: Arc<dyn DraftStore>,
    exam_id: String,
    key: String,
}

impl LocalDrafts {
    pub fn new(store: Arc<dyn DraftStore>, exam_id: &str) -> Self {
        Self { store, exam_id: exam_id.to_string(), key: draft_key(exam_id) }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn save(&self, draft: &Draft) -> bool {
        let result = draft.encode().and_then(|encoded| self.store.set(&self.key, &encoded));
        match result {
            Ok(()) => true,
            Err(err) => {
                metrics::counter!("exam_draft_write_failures_total").increment(1);
                tracing::warn!(exam_id = %self.exam_id, error = %err, "Local draft save failed");
                false
            }
        }
    }

    pub fn load(&self) -> Option<Draft> {
        let raw = match self.store.get(&self.key) {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!(exam_id = %self.exam_id, error = %err, "Local draft read failed");
                return None;
            }
        };
        match Draft::decode(&raw) {
            Ok(draft) => Some(draft),
            Err(err) => {
                tracing::warn!(exam_id = %self.exam_id, error = %err, "Discarding unreadable local draft");
                self.clear();
                None
            }
        }
    }

    pub fn clear(&self) {
        if let Err(err) = self.store.remove(&self.key) {
            tracing::warn!(exam_id = %self.exam_id, error = %err, "Local draft removal failed");
        }
    }
}
