use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use super::editor::EditorHandle;
use super::events::SessionEvent;
use super::loader::{load_session, LoadError};
use super::persistence::{LocalDrafts, SaveOutcome, SaveStatus};
use super::shortcuts::{self, KeyPress, Shortcut};
use super::state::{ExamSession, SubmitPhase};
use super::SessionConfig;
use crate::api::client::ExamBackend;
use crate::api::endpoints::results_redirect;
use crate::domain::answer::AnswerValue;
use crate::domain::draft::DraftStore;
use crate::domain::errors::SessionError;
use crate::domain::language::editor_language;
use crate::domain::question::{AnswerShape, QuestionType};

const UNLOAD_PROMPT: &str = "Your exam is in progress. Are you sure you want to leave?";
const SUBMIT_DEFAULT_ERROR: &str = "We could not submit your exam. Please try again.";
const SUBMIT_NETWORK_ERROR: &str = "Network error while submitting. Your answers are saved locally. \
Please check your connection and tap \"Retry Submit\".";
const SUBMITTED_MESSAGE: &str = "Submitted! Redirecting to results…";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted { redirect: String },
    Failed { message: String },
    /// A submission was already in flight or finished.
    Ignored,
}

struct Live {
    session: ExamSession,
    editors: HashMap<String, Box<dyn EditorHandle>>,
}

struct Inner {
    exam_id: String,
    live: Mutex<Live>,
    backend: Arc<dyn ExamBackend>,
    drafts: LocalDrafts,
    events: mpsc::UnboundedSender<SessionEvent>,
    config: SessionConfig,
    save_in_flight: AtomicBool,
    halt: watch::Sender<bool>,
}

/// Owns one exam session and exposes it as intents. Clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    /// Loads the session and starts the timer and autosave loops. Load failures are also
    /// reported as [`SessionEvent::Fatal`].
    pub async fn boot(
        backend: Arc<dyn ExamBackend>,
        store: Arc<dyn DraftStore>,
        exam_id: &str,
        attempt_id: Option<&str>,
        config: SessionConfig,
        offline: bool,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, LoadError> {
        let drafts = LocalDrafts::new(store, exam_id);
        let mut session =
            match load_session(backend.as_ref(), &drafts, exam_id, attempt_id, &config).await {
                Ok(session) => session,
                Err(err) => {
                    tracing::error!(exam_id, error = %err, "Exam session could not be loaded");
                    events.send(SessionEvent::Fatal { title: err.title().to_string(), message: err.message() }).ok();
                    return Err(err);
                }
            };
        session.offline = offline;

        let controller = Self::new(session, backend, drafts, config, events);
        controller.announce().await;
        controller.start();
        Ok(controller)
    }

    pub(crate) fn new(
        session: ExamSession,
        backend: Arc<dyn ExamBackend>,
        drafts: LocalDrafts,
        config: SessionConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (halt, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                exam_id: session.exam.id.clone(),
                live: Mutex::new(Live { session, editors: HashMap::new() }),
                backend,
                drafts,
                events,
                config,
                save_in_flight: AtomicBool::new(false),
                halt,
            }),
        }
    }

    pub(crate) fn start(&self) {
        tokio::spawn(self.clone().run_timer(self.inner.halt.subscribe()));
        tokio::spawn(self.clone().run_autosave(self.inner.halt.subscribe()));
    }

    async fn announce(&self) {
        let live = self.inner.live.lock().await;
        let session = &live.session;
        self.emit(SessionEvent::Loaded {
            title: session.exam.title.clone(),
            exam_type: session.exam.type_badge(),
            question_count: session.questions.len(),
            remaining: session.remaining_seconds(),
            offline: session.offline,
        });
        if session.offline {
            self.emit(SessionEvent::Offline(true));
        }
        self.refresh(session);
    }

    /// Stops the timer and autosave loops for good.
    pub fn stop(&self) {
        self.inner.halt.send_replace(true);
    }

    pub fn exam_id(&self) -> &str {
        &self.inner.exam_id
    }

    pub async fn inspect<R>(&self, read: impl FnOnce(&ExamSession) -> R) -> R {
        let live = self.inner.live.lock().await;
        read(&live.session)
    }

    pub async fn answer(&self, question_id: &str, value: AnswerValue) -> Result<(), SessionError> {
        self.mutate(|session| session.answer(question_id, value)).await
    }

    /// Picks an option on the current question; a multi-select toggles it.
    pub async fn select_option(&self, option_id: &str) -> Result<(), SessionError> {
        let value = AnswerValue::Choice(option_id.to_string());
        self.mutate_current(|session, question_id| session.answer(question_id, value)).await
    }

    pub async fn set_text(&self, text: &str) -> Result<(), SessionError> {
        let value = AnswerValue::Text(text.to_string());
        self.mutate_current(|session, question_id| session.answer(question_id, value)).await
    }

    pub async fn set_code(&self, code: &str) -> Result<(), SessionError> {
        let code = code.to_string();
        self.mutate_current(|session, question_id| session.set_code(question_id, code, None)).await
    }

    pub async fn set_language(&self, language: &str) -> Result<(), SessionError> {
        let mut live = self.inner.live.lock().await;
        let question = current_question_id(&live.session)?;
        let allowed = live
            .session
            .question(&question)?
            .languages
            .iter()
            .any(|offered| offered.eq_ignore_ascii_case(language));
        if !allowed {
            return Err(SessionError::UnknownOption { question_id: question, option_id: language.to_string() });
        }
        capture_editor(&mut live, &question);
        live.session.set_language(&question, language)?;
        if let Some(editor) = live.editors.get_mut(&question) {
            editor.set_language(editor_language(language));
        }
        self.after_mutation(&live.session);
        Ok(())
    }

    pub async fn clear_answer(&self) -> Result<(), SessionError> {
        let mut live = self.inner.live.lock().await;
        let question = current_question_id(&live.session)?;
        live.session.clear(&question)?;
        let starter = live.session.question(&question)?.starter_code.clone();
        if let Some(editor) = live.editors.get_mut(&question) {
            editor.set_value(&starter);
        }
        self.after_mutation(&live.session);
        Ok(())
    }

    pub async fn toggle_flag(&self) -> Result<bool, SessionError> {
        let mut live = self.inner.live.lock().await;
        let question = current_question_id(&live.session)?;
        let flagged = live.session.toggle_flag(&question)?;
        self.after_mutation(&live.session);
        Ok(flagged)
    }

    pub async fn flag(&self, question_id: &str) -> Result<bool, SessionError> {
        let mut live = self.inner.live.lock().await;
        let flagged = live.session.toggle_flag(question_id)?;
        self.after_mutation(&live.session);
        Ok(flagged)
    }

    /// Hands the session an editor for a coding question and loads the stored code into it.
    pub async fn attach_editor(
        &self,
        question_id: &str,
        mut editor: Box<dyn EditorHandle>,
    ) -> Result<(), SessionError> {
        let mut live = self.inner.live.lock().await;
        let question = live.session.question(question_id)?;
        if question.shape() != AnswerShape::Code {
            return Err(SessionError::ShapeMismatch { question_id: question_id.to_string(), expected: "code" });
        }
        let (code, language) = match live.session.answers.get(question_id) {
            Some(AnswerValue::Code(answer)) if !answer.code.is_empty() => {
                (answer.code.clone(), answer.language.clone())
            }
            Some(AnswerValue::Code(answer)) => (question.starter_code.clone(), answer.language.clone()),
            _ => (question.starter_code.clone(), None),
        };
        let language = language.unwrap_or_else(|| question.default_language().to_string());
        editor.set_value(&code);
        editor.set_language(editor_language(&language));
        live.editors.insert(question_id.to_string(), editor);
        Ok(())
    }

    pub async fn detach_editor(&self, question_id: &str) -> bool {
        let mut live = self.inner.live.lock().await;
        capture_editor(&mut live, question_id);
        let removed = live.editors.remove(question_id).is_some();
        if removed {
            self.persist_local(&live.session);
        }
        removed
    }

    /// Change notification from an attached editor.
    pub async fn editor_changed(&self, question_id: &str) -> Result<(), SessionError> {
        let mut live = self.inner.live.lock().await;
        let Some(code) = live.editors.get(question_id).map(|editor| editor.value()) else {
            return Ok(());
        };
        live.session.set_code(question_id, code, None)?;
        self.after_mutation(&live.session);
        Ok(())
    }

    /// Restores the starter code of the current coding question.
    pub async fn reset_code(&self) -> Result<(), SessionError> {
        let mut live = self.inner.live.lock().await;
        let question_id = current_question_id(&live.session)?;
        let question = live.session.question(&question_id)?;
        if question.shape() != AnswerShape::Code {
            return Err(SessionError::ShapeMismatch { question_id, expected: "code" });
        }
        let starter = question.starter_code.clone();
        if let Some(editor) = live.editors.get_mut(&question_id) {
            editor.set_value(&starter);
        }
        live.session.set_code(&question_id, starter, None)?;
        self.after_mutation(&live.session);
        Ok(())
    }

    pub async fn navigate(&self, index: usize) -> usize {
        let mut live = self.inner.live.lock().await;
        self.move_to(&mut live, index)
    }

    /// Moves forward, or opens the review dialog from the last question.
    pub async fn next(&self) -> usize {
        let mut live = self.inner.live.lock().await;
        if live.session.is_last() {
            self.open_review_locked(&mut live);
            return live.session.current;
        }
        let target = live.session.current + 1;
        self.move_to(&mut live, target)
    }

    pub async fn prev(&self) -> usize {
        let mut live = self.inner.live.lock().await;
        let target = live.session.current.saturating_sub(1);
        self.move_to(&mut live, target)
    }

    pub async fn jump_to_section(&self, section: &str) -> Option<usize> {
        let mut live = self.inner.live.lock().await;
        let target = live.session.section_start(section)?;
        Some(self.move_to(&mut live, target))
    }

    pub async fn open_review(&self) {
        let mut live = self.inner.live.lock().await;
        self.open_review_locked(&mut live);
    }

    pub async fn cancel_review(&self) {
        let mut live = self.inner.live.lock().await;
        if live.session.phase == SubmitPhase::Confirming {
            live.session.phase = SubmitPhase::Idle;
            self.emit(SessionEvent::ReviewClosed);
        }
    }

    /// Ctrl/Cmd+S: captures the editor and saves with a visible confirmation.
    pub async fn manual_save(&self) -> SaveOutcome {
        {
            let mut live = self.inner.live.lock().await;
            if capture_current(&mut live) {
                self.after_mutation(&live.session);
            }
        }
        self.save_to_server(false).await
    }

    pub async fn set_online(&self, online: bool) -> SaveOutcome {
        {
            let mut live = self.inner.live.lock().await;
            if live.session.offline == !online {
                return SaveOutcome::Skipped;
            }
            live.session.offline = !online;
            tracing::info!(exam_id = %self.inner.exam_id, online, "Connectivity changed");
            self.emit(SessionEvent::Offline(!online));
            if !online {
                self.persist_local(&live.session);
                self.set_status(&mut live.session, SaveStatus::Local);
                return SaveOutcome::Offline;
            }
        }
        self.save_to_server(true).await
    }

    /// Returns the leave-page prompt, after flushing the draft, unless a submission is under way.
    pub async fn before_unload(&self) -> Option<&'static str> {
        let mut live = self.inner.live.lock().await;
        if matches!(live.session.phase, SubmitPhase::Submitting | SubmitPhase::Succeeded) {
            return None;
        }
        capture_current(&mut live);
        self.persist_local(&live.session);
        Some(UNLOAD_PROMPT)
    }

    pub async fn handle_key(&self, press: &KeyPress) -> Option<Shortcut> {
        let (shortcut, is_last, option) = {
            let live = self.inner.live.lock().await;
            let current = live.session.current_question();
            let shortcut = shortcuts::resolve(press, current.map(|question| &question.kind))?;
            let option = match shortcut {
                Shortcut::SelectOption(position) => {
                    current.and_then(|question| question.options.get(position)).map(|option| option.id.clone())
                }
                _ => None,
            };
            (shortcut, live.session.is_last(), option)
        };

        let result = match shortcut {
            Shortcut::Next if !is_last => {
                self.next().await;
                Ok(())
            }
            Shortcut::Next => Ok(()),
            Shortcut::Previous => {
                self.prev().await;
                Ok(())
            }
            Shortcut::ToggleFlag => self.toggle_flag().await.map(|_| ()),
            Shortcut::ManualSave => {
                self.manual_save().await;
                Ok(())
            }
            Shortcut::SelectOption(_) => match option {
                Some(option) => self.select_option(&option).await,
                None => Ok(()),
            },
        };
        if let Err(err) = result {
            tracing::debug!(error = %err, "Shortcut ignored");
        }
        Some(shortcut)
    }

    /// One non-final save to the server. Skips when a save is already in flight.
    pub async fn save_to_server(&self, silent: bool) -> SaveOutcome {
        let (payload, revision) = {
            let mut live = self.inner.live.lock().await;
            if live.session.phase.is_locked() {
                return SaveOutcome::Skipped;
            }
            if live.session.offline {
                self.persist_local(&live.session);
                self.set_status(&mut live.session, SaveStatus::Local);
                return SaveOutcome::Offline;
            }
            if self.inner.save_in_flight.swap(true, Ordering::SeqCst) {
                tracing::debug!(exam_id = %self.inner.exam_id, "Autosave skipped; previous save still in flight");
                return SaveOutcome::Skipped;
            }
            self.set_status(&mut live.session, SaveStatus::Saving);
            (live.session.build_payload(false), live.session.revision)
        };

        let result = self.inner.backend.save_answers(&self.inner.exam_id, &payload).await;
        self.inner.save_in_flight.store(false, Ordering::SeqCst);

        let mut live = self.inner.live.lock().await;
        match result {
            Ok(_) => {
                metrics::counter!("exam_autosave_total", "status" => "ok").increment(1);
                if live.session.phase.is_locked() {
                    return SaveOutcome::Saved;
                }
                self.set_status(&mut live.session, SaveStatus::Saved);
                if !silent {
                    self.emit(SessionEvent::Toast("Answers saved!".to_string()));
                }
                // Edits made while the request was in flight are only in the draft.
                if live.session.revision == revision {
                    self.inner.drafts.clear();
                }
                SaveOutcome::Saved
            }
            Err(err) => {
                metrics::counter!("exam_autosave_total", "status" => "error").increment(1);
                tracing::warn!(exam_id = %self.inner.exam_id, error = %err, "Autosave failed");
                if live.session.phase.is_locked() {
                    return SaveOutcome::Failed;
                }
                let status =
                    if live.session.offline && err.is_network() { SaveStatus::Local } else { SaveStatus::Failed };
                self.persist_local(&live.session);
                self.set_status(&mut live.session, status);
                SaveOutcome::Failed
            }
        }
    }

    /// Final submission. Safe to call repeatedly; only one POST is ever in flight.
    pub async fn submit(&self) -> SubmitOutcome {
        let (payload, attempt_id) = {
            let mut live = self.inner.live.lock().await;
            if matches!(live.session.phase, SubmitPhase::Submitting | SubmitPhase::Succeeded) {
                return SubmitOutcome::Ignored;
            }
            self.stop();
            capture_current_as(&mut live, Capture::Final);
            let Some(payload) = live.session.begin_submit() else {
                return SubmitOutcome::Ignored;
            };
            self.persist_local(&live.session);
            self.emit(SessionEvent::Submitting);
            (payload, live.session.attempt_id.clone())
        };

        tracing::info!(exam_id = %self.inner.exam_id, attempt_id = %attempt_id, "Submitting exam");
        let result = self.inner.backend.submit_answers(&self.inner.exam_id, &payload).await;

        let redirect = {
            let mut live = self.inner.live.lock().await;
            match result {
                Ok(_) => {
                    metrics::counter!("exam_submit_total", "status" => "ok").increment(1);
                    live.session.phase = SubmitPhase::Succeeded;
                    self.inner.drafts.clear();
                    tracing::info!(exam_id = %self.inner.exam_id, attempt_id = %attempt_id, "Exam submitted");
                    self.emit(SessionEvent::Submitted { message: SUBMITTED_MESSAGE.to_string() });
                    results_redirect(&self.inner.config.results_route, &self.inner.exam_id, &attempt_id)
                }
                Err(err) => {
                    metrics::counter!("exam_submit_total", "status" => "error").increment(1);
                    tracing::error!(exam_id = %self.inner.exam_id, error = %err, "Exam submission failed");
                    let message = if err.is_network() {
                        SUBMIT_NETWORK_ERROR.to_string()
                    } else {
                        format!(
                            "Submission failed: {}",
                            err.message().unwrap_or_else(|| SUBMIT_DEFAULT_ERROR.to_string())
                        )
                    };
                    live.session.phase = SubmitPhase::Failed { message: message.clone() };
                    self.persist_local(&live.session);
                    self.emit(SessionEvent::SubmitFailed { message: message.clone() });
                    return SubmitOutcome::Failed { message };
                }
            }
        };

        sleep(self.inner.config.redirect_delay).await;
        self.emit(SessionEvent::Redirect { url: redirect.clone() });
        SubmitOutcome::Submitted { redirect }
    }

    /// Retry affordance after a failed submission.
    pub async fn retry(&self) -> SubmitOutcome {
        let failed = self.inspect(|session| matches!(session.phase, SubmitPhase::Failed { .. })).await;
        if !failed {
            return SubmitOutcome::Ignored;
        }
        self.submit().await
    }

    /// Time ran out: flush every attached editor, then run the normal pipeline.
    pub async fn auto_submit(&self) -> SubmitOutcome {
        {
            let mut live = self.inner.live.lock().await;
            let open: Vec<String> = live.editors.keys().cloned().collect();
            for question_id in open {
                capture_editor_as(&mut live, &question_id, Capture::Final);
            }
            self.persist_local(&live.session);
        }
        tracing::info!(exam_id = %self.inner.exam_id, "Time expired; submitting automatically");
        self.submit().await
    }

    async fn run_timer(self, mut halt: watch::Receiver<bool>) {
        let period = self.inner.config.tick_interval;
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = halt.changed() => break,
                _ = tick.tick() => {
                    if *halt.borrow() {
                        break;
                    }
                    match self.on_tick().await {
                        Some(true) => {
                            self.auto_submit().await;
                            break;
                        }
                        Some(false) => {}
                        None => break,
                    }
                }
            }
        }
    }

    /// `Some(expired)` while the clock runs, `None` once it has stopped.
    async fn on_tick(&self) -> Option<bool> {
        let mut live = self.inner.live.lock().await;
        if !live.session.countdown.is_running() {
            return None;
        }
        let tick = live.session.countdown.tick();
        self.emit(SessionEvent::TimerTick {
            remaining: tick.remaining,
            display: live.session.countdown.display(),
            level: live.session.countdown.level(),
        });
        for warning in &tick.warnings {
            self.emit(SessionEvent::TimeWarning { message: warning.message.to_string(), urgent: warning.urgent });
        }
        Some(tick.expired)
    }

    async fn run_autosave(self, mut halt: watch::Receiver<bool>) {
        let period = self.inner.config.autosave_interval;
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = halt.changed() => break,
                _ = tick.tick() => {
                    if *halt.borrow() {
                        break;
                    }
                    let controller = self.clone();
                    // Detached so a slow request never delays the next tick's skip decision.
                    tokio::spawn(async move {
                        controller.save_to_server(true).await;
                    });
                }
            }
        }
    }

    async fn mutate<F>(&self, change: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut ExamSession) -> Result<(), SessionError>,
    {
        let mut live = self.inner.live.lock().await;
        change(&mut live.session)?;
        self.after_mutation(&live.session);
        Ok(())
    }

    async fn mutate_current<F>(&self, change: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut ExamSession, &str) -> Result<(), SessionError>,
    {
        let mut live = self.inner.live.lock().await;
        let question_id = current_question_id(&live.session)?;
        change(&mut live.session, &question_id)?;
        self.after_mutation(&live.session);
        Ok(())
    }

    fn move_to(&self, live: &mut MutexGuard<'_, Live>, index: usize) -> usize {
        let captured = capture_current(live);
        let current = live.session.navigate(index);
        if captured {
            self.persist_local(&live.session);
            let controller = self.clone();
            tokio::spawn(async move {
                controller.save_to_server(true).await;
            });
        }
        self.refresh(&live.session);
        current
    }

    fn open_review_locked(&self, live: &mut MutexGuard<'_, Live>) {
        if capture_current(live) {
            self.persist_local(&live.session);
        }
        if !matches!(live.session.phase, SubmitPhase::Idle | SubmitPhase::Confirming) {
            return;
        }
        live.session.phase = SubmitPhase::Confirming;
        self.emit(SessionEvent::ReviewOpened(live.session.progress()));
    }

    fn after_mutation(&self, session: &ExamSession) {
        self.persist_local(session);
        self.refresh(session);
    }

    fn persist_local(&self, session: &ExamSession) {
        self.inner.drafts.save(&session.draft());
    }

    fn refresh(&self, session: &ExamSession) {
        if let Some(view) = session.view() {
            self.emit(SessionEvent::QuestionShown(Box::new(view)));
        }
        self.emit(SessionEvent::ProgressChanged { progress: session.progress(), navigator: session.navigator() });
    }

    fn set_status(&self, session: &mut ExamSession, status: SaveStatus) {
        session.save_status = Some(status);
        self.emit(SessionEvent::SaveStatus(status));
    }

    fn emit(&self, event: SessionEvent) {
        self.inner.events.send(event).ok();
    }
}

fn current_question_id(session: &ExamSession) -> Result<String, SessionError> {
    session
        .current_question()
        .map(|question| question.id.clone())
        .ok_or(SessionError::OutOfRange { index: session.current, len: session.questions.len() })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    /// Untouched starter code stays unanswered.
    Edits,
    /// Whatever the editor shows becomes the answer.
    Final,
}

/// Pulls the current question's editor contents into the store.
fn capture_current(live: &mut Live) -> bool {
    capture_current_as(live, Capture::Edits)
}

fn capture_current_as(live: &mut Live, mode: Capture) -> bool {
    let Some(question) = live.session.current_question() else {
        return false;
    };
    if question.kind != QuestionType::Coding {
        return false;
    }
    let question_id = question.id.clone();
    capture_editor_as(live, &question_id, mode)
}

fn capture_editor(live: &mut Live, question_id: &str) -> bool {
    capture_editor_as(live, question_id, Capture::Edits)
}

fn capture_editor_as(live: &mut Live, question_id: &str, mode: Capture) -> bool {
    let Some(code) = live.editors.get(question_id).map(|editor| editor.value()) else {
        return false;
    };
    match mode {
        Capture::Edits => live.session.capture_code(question_id, code),
        Capture::Final => live.session.capture_final_code(question_id, code),
    }
}
