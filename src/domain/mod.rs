pub mod answer;
pub mod draft;
pub mod errors;
pub mod language;
pub mod question;
pub mod timer;

pub use answer::{AnswerStore, AnswerValue, CodeAnswer, Progress};
pub use draft::{Draft, DraftPrecedence, DraftStore, FileDraftStore, MemoryDraftStore};
pub use errors::{SessionError, StorageError};
pub use question::{AnswerShape, ChoiceOption, Question, QuestionType};
pub use timer::{Countdown, TimerLevel, TimerState, Warning};
