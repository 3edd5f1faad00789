use crate::core::time::now_millis;
use crate::domain::answer::{wire_answer, AnswerStore, AnswerValue, Progress};
use crate::domain::draft::Draft;
use crate::domain::errors::SessionError;
use crate::domain::language::language_label;
use crate::domain::question::{option_key, AnswerShape, Question, QuestionType};
use crate::domain::timer::Countdown;
use crate::schemas::payload::{AnswerPayload, SubmitPayload};

use super::persistence::SaveStatus;

#[derive(Debug, Clone, PartialEq)]
pub struct ExamInfo {
    pub id: String,
    pub title: String,
    pub duration_minutes: Option<f64>,
    pub total_marks: Option<f64>,
    pub exam_type: Option<String>,
}

impl ExamInfo {
    pub fn type_badge(&self) -> String {
        self.exam_type.as_deref().map(str::to_uppercase).unwrap_or_default()
    }
}

/// Submission pipeline position. `Failed` only leads back into `Submitting`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitPhase {
    Idle,
    Confirming,
    Submitting,
    Succeeded,
    Failed { message: String },
}

impl SubmitPhase {
    /// Answers are frozen from the first terminal POST onwards.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Submitting | Self::Succeeded | Self::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Confirming => "confirming",
            Self::Submitting => "submitting",
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Current,
    FlaggedAnswered,
    Flagged,
    Answered,
    Unanswered,
}

impl NavState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::FlaggedAnswered => "flagged_answered",
            Self::Flagged => "flagged",
            Self::Answered => "answered",
            Self::Unanswered => "unanswered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionView {
    pub key: String,
    pub id: String,
    pub text: String,
    pub selected: bool,
}

/// Everything a front end needs to draw one question.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionView {
    pub index: usize,
    pub total: usize,
    pub id: String,
    pub type_label: String,
    pub text: String,
    pub marks: String,
    pub section: Option<String>,
    pub image: Option<String>,
    pub flagged: bool,
    pub multi: bool,
    pub options: Vec<OptionView>,
    pub text_answer: Option<String>,
    pub char_count: Option<String>,
    pub placeholder: Option<&'static str>,
    pub code: Option<String>,
    pub language: Option<String>,
    pub languages: Vec<(String, String)>,
    pub is_first: bool,
    pub is_last: bool,
}

/// The single in-memory state of one attempt.
#[derive(Debug, Clone)]
pub struct ExamSession {
    pub(crate) exam: ExamInfo,
    pub(crate) attempt_id: String,
    pub(crate) questions: Vec<Question>,
    pub(crate) answers: AnswerStore,
    pub(crate) sections: Vec<String>,
    pub(crate) current: usize,
    pub(crate) countdown: Countdown,
    pub(crate) phase: SubmitPhase,
    pub(crate) offline: bool,
    pub(crate) save_status: Option<SaveStatus>,
    /// Bumped on every answer or flag change.
    pub(crate) revision: u64,
}

impl ExamSession {
    pub(crate) fn new(
        exam: ExamInfo,
        attempt_id: String,
        questions: Vec<Question>,
        answers: AnswerStore,
        remaining_seconds: u64,
    ) -> Self {
        let mut sections: Vec<String> = Vec::new();
        for section in questions.iter().filter_map(|question| question.section.as_ref()) {
            if !sections.contains(section) {
                sections.push(section.clone());
            }
        }

        Self {
            exam,
            attempt_id,
            questions,
            answers,
            sections,
            current: 0,
            countdown: Countdown::new(remaining_seconds),
            phase: SubmitPhase::Idle,
            offline: false,
            save_status: None,
            revision: 0,
        }
    }

    pub fn exam(&self) -> &ExamInfo {
        &self.exam
    }

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &AnswerStore {
        &self.answers
    }

    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    /// Section jump buttons only make sense with two or more sections.
    pub fn shows_sections(&self) -> bool {
        self.sections.len() >= 2
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.countdown.remaining()
    }

    pub fn phase(&self) -> &SubmitPhase {
        &self.phase
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn save_status(&self) -> Option<SaveStatus> {
        self.save_status
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn question(&self, question_id: &str) -> Result<&Question, SessionError> {
        self.questions
            .iter()
            .find(|question| question.id == question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))
    }

    pub fn progress(&self) -> Progress {
        self.answers.progress(&self.questions)
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 >= self.questions.len()
    }

    pub fn navigator(&self) -> Vec<NavState> {
        self.questions
            .iter()
            .enumerate()
            .map(|(index, question)| {
                let answered = self.answers.is_answered(question);
                let flagged = self.answers.is_flagged(&question.id);
                match (index == self.current, flagged, answered) {
                    (true, _, _) => NavState::Current,
                    (false, true, true) => NavState::FlaggedAnswered,
                    (false, true, false) => NavState::Flagged,
                    (false, false, true) => NavState::Answered,
                    (false, false, false) => NavState::Unanswered,
                }
            })
            .collect()
    }

    pub fn answer(&mut self, question_id: &str, value: AnswerValue) -> Result<(), SessionError> {
        self.ensure_mutable()?;
        let question = self.question(question_id)?.clone();
        self.answers.set(&question, value)?;
        self.touch();
        Ok(())
    }

    pub fn set_code(
        &mut self,
        question_id: &str,
        code: String,
        language: Option<String>,
    ) -> Result<(), SessionError> {
        self.ensure_mutable()?;
        let question = self.question(question_id)?.clone();
        let language = language.or_else(|| self.answers.language_of(question_id)).or_else(|| {
            Some(question.default_language().to_string())
        });
        self.answers.set_code(&question, code, language)?;
        self.touch();
        Ok(())
    }

    pub fn set_language(&mut self, question_id: &str, language: &str) -> Result<(), SessionError> {
        self.ensure_mutable()?;
        let question = self.question(question_id)?.clone();
        self.answers.set_language(&question, language.to_string())?;
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self, question_id: &str) -> Result<bool, SessionError> {
        self.ensure_mutable()?;
        self.question(question_id)?;
        let removed = self.answers.clear(question_id);
        self.touch();
        Ok(removed)
    }

    pub fn toggle_flag(&mut self, question_id: &str) -> Result<bool, SessionError> {
        self.ensure_mutable()?;
        self.question(question_id)?;
        let flagged = self.answers.toggle_flag(question_id);
        self.touch();
        Ok(flagged)
    }

    /// Clamps `index` into range and makes it current.
    pub fn navigate(&mut self, index: usize) -> usize {
        self.current = index.min(self.questions.len().saturating_sub(1));
        self.current
    }

    pub fn section_start(&self, section: &str) -> Option<usize> {
        if !self.shows_sections() {
            return None;
        }
        self.questions.iter().position(|question| question.section.as_deref() == Some(section))
    }

    /// Writes editor contents into a coding answer even after the lock, so the final
    /// payload carries the last keystrokes. Returns whether the stored code changed.
    /// An untouched editor still showing the starter code is not a change.
    pub(crate) fn capture_code(&mut self, question_id: &str, code: String) -> bool {
        self.store_editor_code(question_id, code, false)
    }

    /// Like [`capture_code`](Self::capture_code) but keeps the editor text as the answer
    /// even when it is the unmodified starter code. Used right before submitting.
    pub(crate) fn capture_final_code(&mut self, question_id: &str, code: String) -> bool {
        self.store_editor_code(question_id, code, true)
    }

    fn store_editor_code(&mut self, question_id: &str, code: String, keep_starter: bool) -> bool {
        let Ok(question) = self.question(question_id) else {
            return false;
        };
        if question.shape() != AnswerShape::Code {
            return false;
        }
        let question = question.clone();
        let unchanged = match self.answers.get(question_id) {
            Some(AnswerValue::Code(existing)) if !existing.code.is_empty() => existing.code == code,
            _ if keep_starter => code.is_empty(),
            _ => code == question.starter_code,
        };
        if unchanged {
            return false;
        }
        let language = self
            .answers
            .language_of(question_id)
            .or_else(|| Some(question.default_language().to_string()));
        if self.answers.set_code(&question, code, language).is_err() {
            return false;
        }
        self.touch();
        true
    }

    pub fn elapsed_seconds(&self) -> Option<i64> {
        let minutes = self.exam.duration_minutes?;
        let declared = (minutes * 60.0).round() as i64;
        Some((declared - self.countdown.remaining() as i64).max(0))
    }

    pub fn build_payload(&self, is_final: bool) -> SubmitPayload {
        SubmitPayload {
            attempt_id: self.attempt_id.clone(),
            answers: self
                .questions
                .iter()
                .map(|question| AnswerPayload {
                    question_id: question.id.clone(),
                    answer: wire_answer(&question.kind, self.answers.get(&question.id)),
                })
                .collect(),
            flagged: self.answers.flagged().iter().cloned().collect(),
            is_final,
            time_taken: self.elapsed_seconds(),
        }
    }

    pub fn draft(&self) -> Draft {
        Draft::capture(&self.answers, &self.attempt_id, now_millis())
    }

    /// Enters `Submitting` and returns the final payload, or `None` if a submission is
    /// already under way or done.
    pub(crate) fn begin_submit(&mut self) -> Option<SubmitPayload> {
        if matches!(self.phase, SubmitPhase::Submitting | SubmitPhase::Succeeded) {
            return None;
        }
        self.phase = SubmitPhase::Submitting;
        self.countdown.stop();
        Some(self.build_payload(true))
    }

    pub fn view(&self) -> Option<QuestionView> {
        let question = self.current_question()?;
        let stored = self.answers.get(&question.id);
        let selected: Vec<&str> = match stored {
            Some(AnswerValue::Choice(id)) => vec![id.as_str()],
            Some(AnswerValue::Choices(ids)) => ids.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        };
        let shape = question.shape();

        let (text_answer, char_count, placeholder) = if shape == AnswerShape::Text {
            let text = match stored {
                Some(AnswerValue::Text(text)) => text.clone(),
                _ => String::new(),
            };
            let count = question.char_count_label(&text);
            (Some(text), Some(count), Some(question.kind.placeholder()))
        } else {
            (None, None, None)
        };

        let (code, language) = if shape == AnswerShape::Code {
            let (code, language) = match stored {
                Some(AnswerValue::Code(answer)) => (answer.code.clone(), answer.language.clone()),
                _ => (String::new(), None),
            };
            let code = if code.is_empty() { question.starter_code.clone() } else { code };
            let language = language.unwrap_or_else(|| question.default_language().to_string());
            (Some(code), Some(language))
        } else {
            (None, None)
        };

        Some(QuestionView {
            index: self.current,
            total: self.questions.len(),
            id: question.id.clone(),
            type_label: question.kind.label().to_string(),
            text: question.text.clone(),
            marks: question.marks_label(),
            section: question.section.clone(),
            image: question.image.clone(),
            flagged: self.answers.is_flagged(&question.id),
            multi: question.kind == QuestionType::MultipleChoice,
            options: question
                .options
                .iter()
                .enumerate()
                .map(|(index, option)| OptionView {
                    key: option_key(index),
                    id: option.id.clone(),
                    text: option.text.clone(),
                    selected: selected.contains(&option.id.as_str()),
                })
                .collect(),
            text_answer,
            char_count,
            placeholder,
            code,
            language,
            languages: if shape == AnswerShape::Code {
                question.languages.iter().map(|lang| (lang.clone(), language_label(lang))).collect()
            } else {
                Vec::new()
            },
            is_first: self.current == 0,
            is_last: self.is_last(),
        })
    }

    fn ensure_mutable(&self) -> Result<(), SessionError> {
        if self.phase.is_locked() {
            return Err(SessionError::Locked);
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support;

    fn session() -> ExamSession {
        test_support::sample_session(120)
    }

    #[test]
    fn navigator_reports_flagged_and_answered_states() {
        let mut session = session();
        session.answer("q1", AnswerValue::Choice("o1".to_string())).expect("q1");
        session.toggle_flag("q2").expect("flag q2");
        session.toggle_flag("q1").expect("flag q1");
        session.navigate(2);

        assert_eq!(
            session.navigator(),
            vec![NavState::FlaggedAnswered, NavState::Flagged, NavState::Current]
        );
        assert_eq!(NavState::FlaggedAnswered.as_str(), "flagged_answered");
    }

    #[test]
    fn navigation_clamps_into_range() {
        let mut session = session();
        assert_eq!(session.navigate(99), 2);
        assert!(session.is_last());
        assert_eq!(session.navigate(0), 0);
    }

    #[test]
    fn payload_uses_wire_shapes_and_elapsed_time() {
        let mut session = session();
        session.answer("q1", AnswerValue::Choice("o2".to_string())).expect("q1");
        session.answer("q2", AnswerValue::Choice("green".to_string())).expect("q2");
        session.set_code("q3", "print('hi')".to_string(), None).expect("q3");
        session.countdown.advance(20);

        let payload = session.build_payload(false);
        assert_eq!(payload.attempt_id, "a-1");
        assert!(!payload.is_final);
        assert_eq!(payload.answer_for("q1"), Some(&json!("o2")));
        assert_eq!(payload.answer_for("q2"), Some(&json!(["green"])));
        assert_eq!(payload.answer_for("q3"), Some(&json!("print('hi')")));
        // 60 declared minutes, 100 seconds left.
        assert_eq!(payload.time_taken, Some(3500));
    }

    #[test]
    fn begin_submit_locks_answers_once() {
        let mut session = session();
        let payload = session.begin_submit().expect("first submit");
        assert!(payload.is_final);
        assert!(session.begin_submit().is_none());
        assert!(!session.countdown().is_running());

        let err = session.answer("q1", AnswerValue::Choice("o1".to_string())).expect_err("locked");
        assert_eq!(err, SessionError::Locked);
        assert_eq!(session.toggle_flag("q1").expect_err("locked"), SessionError::Locked);
    }

    #[test]
    fn failed_phase_allows_a_new_submission() {
        let mut session = session();
        session.begin_submit().expect("submit");
        session.phase = SubmitPhase::Failed { message: "offline".to_string() };
        assert!(session.phase().is_locked());
        assert!(session.begin_submit().is_some());
    }

    #[test]
    fn capture_bypasses_lock_and_reports_changes() {
        let mut session = session();
        session.begin_submit().expect("submit");
        assert!(!session.capture_code("q3", "# write your solution\n".to_string()));
        assert!(session.capture_code("q3", "late edit".to_string()));
        assert!(!session.capture_code("q3", "late edit".to_string()));
        assert!(!session.capture_code("q1", "not code".to_string()));
        assert_eq!(session.build_payload(true).answer_for("q3"), Some(&json!("late edit")));
    }

    #[test]
    fn final_capture_keeps_untouched_starter_code() {
        let mut session = session();
        session.begin_submit().expect("submit");
        assert!(!session.capture_code("q3", "# write your solution\n".to_string()));
        assert_eq!(session.build_payload(true).answer_for("q3"), Some(&json!("")));

        assert!(session.capture_final_code("q3", "# write your solution\n".to_string()));
        assert!(!session.capture_final_code("q3", "# write your solution\n".to_string()));
        assert!(!session.capture_final_code("q1", "not code".to_string()));
        assert_eq!(
            session.build_payload(true).answer_for("q3"),
            Some(&json!("# write your solution\n"))
        );
    }

    #[test]
    fn view_describes_the_current_question() {
        let mut session = session();
        session.answer("q2", AnswerValue::Choice("blue".to_string())).expect("q2");
        session.navigate(1);

        let view = session.view().expect("view");
        assert_eq!(view.type_label, "Multi-Select");
        assert!(view.multi);
        assert_eq!(view.options.iter().map(|o| o.key.as_str()).collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert_eq!(view.options.iter().filter(|o| o.selected).count(), 1);

        session.navigate(2);
        let view = session.view().expect("view");
        assert_eq!(view.code.as_deref(), Some("# write your solution\n"));
        assert_eq!(view.language.as_deref(), Some("python"));
        assert_eq!(view.languages[1], ("rust".to_string(), "Rust".to_string()));
        assert!(view.is_last);
    }

    #[test]
    fn section_jump_needs_two_sections() {
        let session = session();
        assert!(session.shows_sections());
        assert_eq!(session.section_start("Coding"), Some(2));
        assert_eq!(session.section_start("History"), None);
    }
}
