use std::time::Duration;

use crate::domain::draft::DraftPrecedence;

pub mod controller;
pub mod editor;
pub mod events;
pub mod loader;
pub mod persistence;
pub mod shortcuts;
pub mod state;


pub use controller::{SessionController, SubmitOutcome};
pub use editor::{BufferEditor, EditorHandle};
pub use events::SessionEvent;
pub use loader::{load_session, LoadError};
pub use persistence::{LocalDrafts, SaveOutcome, SaveStatus};
pub use shortcuts::{Focus, KeyPress, Shortcut};
pub use state::{ExamInfo, ExamSession, NavState, QuestionView, SubmitPhase};

/// Timing and policy knobs for one running session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub autosave_interval: Duration,
    pub tick_interval: Duration,
    pub redirect_delay: Duration,
    /// Remaining time used when neither the attempt nor the exam declares one.
    pub default_time_seconds: u64,
    pub results_route: String,
    pub draft_precedence: DraftPrecedence,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave_interval: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
            redirect_delay: Duration::from_millis(1500),
            default_time_seconds: 3600,
            results_route: String::from("results.html"),
            draft_precedence: DraftPrecedence::ServerFirst,
        }
    }
}
