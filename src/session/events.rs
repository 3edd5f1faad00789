use crate::domain::answer::Progress;
use crate::domain::timer::TimerLevel;

use super::persistence::SaveStatus;
use super::state::{NavState, QuestionView};

/// Everything the session tells its front end. Delivered in order over an unbounded channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Loaded {
        title: String,
        exam_type: String,
        question_count: usize,
        remaining: u64,
        offline: bool,
    },
    /// Load failed; the front end replaces its whole interface with this.
    Fatal { title: String, message: String },
    QuestionShown(Box<QuestionView>),
    ProgressChanged { progress: Progress, navigator: Vec<NavState> },
    TimerTick { remaining: u64, display: String, level: TimerLevel },
    TimeWarning { message: String, urgent: bool },
    SaveStatus(SaveStatus),
    Toast(String),
    Offline(bool),
    ReviewOpened(Progress),
    ReviewClosed,
    Submitting,
    SubmitFailed { message: String },
    Submitted { message: String },
    Redirect { url: String },
}
