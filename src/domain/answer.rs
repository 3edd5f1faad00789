use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::errors::SessionError;
use super::question::{AnswerShape, Question, QuestionType};
use crate::schemas::id_string;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeAnswer {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A stored answer. The variant always matches the owning question's [`AnswerShape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerValue {
    Choice(String),
    Choices(Vec<String>),
    Text(String),
    Code(CodeAnswer),
}

impl AnswerValue {
    pub fn shape(&self) -> AnswerShape {
        match self {
            Self::Choice(_) => AnswerShape::Choice,
            Self::Choices(_) => AnswerShape::Choices,
            Self::Text(_) => AnswerShape::Text,
            Self::Code(_) => AnswerShape::Code,
        }
    }

    /// The emptiness rule behind progress and navigator colouring.
    pub fn is_present(&self) -> bool {
        match self {
            Self::Choice(text) | Self::Text(text) => !text.trim().is_empty(),
            Self::Choices(ids) => !ids.is_empty(),
            Self::Code(answer) => !answer.code.trim().is_empty(),
        }
    }

    /// Reads a stored or server-supplied value into the given shape, tolerating the
    /// neighbouring encodings (a bare code string, a single id for a multi-select).
    pub fn from_json(shape: AnswerShape, value: &Value) -> Option<Self> {
        match shape {
            AnswerShape::Choice => match value {
                Value::Array(items) => items.first().and_then(id_string).map(Self::Choice),
                other => id_string(other).map(Self::Choice),
            },
            AnswerShape::Choices => {
                let ids: Vec<String> = match value {
                    Value::Array(items) => items.iter().filter_map(id_string).collect(),
                    other => id_string(other).into_iter().collect(),
                };
                (!ids.is_empty()).then_some(Self::Choices(ids))
            }
            AnswerShape::Text => match value {
                Value::String(text) => Some(Self::Text(text.clone())),
                Value::Number(number) => Some(Self::Text(number.to_string())),
                Value::Bool(flag) => Some(Self::Text(flag.to_string())),
                _ => None,
            },
            AnswerShape::Code => match value {
                Value::String(code) => Some(Self::Code(CodeAnswer { code: code.clone(), language: None })),
                Value::Object(_) => serde_json::from_value::<CodeAnswer>(value.clone()).ok().map(Self::Code),
                _ => None,
            },
        }
    }

    /// Draft encoding; `from_json` with the same shape reads it back unchanged.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Choice(id) => Value::String(id.clone()),
            Self::Choices(ids) => json!(ids),
            Self::Text(text) => Value::String(text.clone()),
            Self::Code(answer) => json!(answer),
        }
    }
}

/// Wire shape sent to the save and submit endpoints for one question.
pub fn wire_answer(kind: &QuestionType, value: Option<&AnswerValue>) -> Value {
    match (kind, value) {
        (QuestionType::Mcq, Some(AnswerValue::Choice(id))) => Value::String(id.clone()),
        (QuestionType::Mcq, _) => Value::Null,
        (QuestionType::MultipleChoice, Some(AnswerValue::Choices(ids))) => json!(ids),
        (QuestionType::MultipleChoice, _) => json!([]),
        (QuestionType::Coding, Some(AnswerValue::Code(answer))) => Value::String(answer.code.clone()),
        (_, Some(AnswerValue::Text(text) | AnswerValue::Choice(text))) => Value::String(text.clone()),
        _ => Value::String(String::new()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub answered: usize,
    pub unanswered: usize,
    pub flagged: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.answered as f64 / self.total as f64) * 100.0).round() as u8
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerStore {
    values: BTreeMap<String, AnswerValue>,
    flagged: BTreeSet<String>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(values: BTreeMap<String, AnswerValue>, flagged: BTreeSet<String>) -> Self {
        Self { values, flagged }
    }

    pub fn get(&self, question_id: &str) -> Option<&AnswerValue> {
        self.values.get(question_id)
    }

    pub fn values(&self) -> &BTreeMap<String, AnswerValue> {
        &self.values
    }

    pub fn flagged(&self) -> &BTreeSet<String> {
        &self.flagged
    }

    pub fn is_flagged(&self, question_id: &str) -> bool {
        self.flagged.contains(question_id)
    }

    /// Writes `value` for `question`. A single id on a multi-select toggles that id; an
    /// empty text answer removes the entry.
    pub fn set(&mut self, question: &Question, value: AnswerValue) -> Result<(), SessionError> {
        let shape = question.shape();
        match (shape, value) {
            (AnswerShape::Choices, AnswerValue::Choice(option_id)) => {
                self.ensure_option(question, &option_id)?;
                self.toggle_choice(&question.id, option_id);
            }
            (AnswerShape::Choice, AnswerValue::Choice(option_id)) => {
                self.ensure_option(question, &option_id)?;
                self.values.insert(question.id.clone(), AnswerValue::Choice(option_id));
            }
            (AnswerShape::Choices, AnswerValue::Choices(ids)) => {
                for option_id in &ids {
                    self.ensure_option(question, option_id)?;
                }
                let mut deduped: Vec<String> = Vec::with_capacity(ids.len());
                for option_id in ids {
                    if !deduped.contains(&option_id) {
                        deduped.push(option_id);
                    }
                }
                self.put_or_remove(&question.id, AnswerValue::Choices(deduped));
            }
            (AnswerShape::Text, AnswerValue::Text(text)) => {
                if text.is_empty() {
                    self.values.remove(&question.id);
                } else {
                    self.values.insert(question.id.clone(), AnswerValue::Text(text));
                }
            }
            (AnswerShape::Code, AnswerValue::Code(answer)) => {
                self.values.insert(question.id.clone(), AnswerValue::Code(answer));
            }
            (expected, _) => {
                return Err(SessionError::ShapeMismatch {
                    question_id: question.id.clone(),
                    expected: expected.as_str(),
                });
            }
        }
        Ok(())
    }

    /// Replaces the code of a coding answer. `language` of `None` keeps the stored one.
    pub fn set_code(
        &mut self,
        question: &Question,
        code: String,
        language: Option<String>,
    ) -> Result<(), SessionError> {
        let language = language.or_else(|| self.language_of(&question.id));
        self.set(question, AnswerValue::Code(CodeAnswer { code, language }))
    }

    /// Changes only the language of a coding answer.
    pub fn set_language(&mut self, question: &Question, language: String) -> Result<(), SessionError> {
        let code = match self.values.get(&question.id) {
            Some(AnswerValue::Code(answer)) => answer.code.clone(),
            _ => String::new(),
        };
        self.set(question, AnswerValue::Code(CodeAnswer { code, language: Some(language) }))
    }

    pub fn language_of(&self, question_id: &str) -> Option<String> {
        match self.values.get(question_id) {
            Some(AnswerValue::Code(answer)) => answer.language.clone(),
            _ => None,
        }
    }

    /// Removes the entry entirely. Returns whether anything was stored.
    pub fn clear(&mut self, question_id: &str) -> bool {
        self.values.remove(question_id).is_some()
    }

    /// Returns the flag state after the toggle.
    pub fn toggle_flag(&mut self, question_id: &str) -> bool {
        if self.flagged.remove(question_id) {
            false
        } else {
            self.flagged.insert(question_id.to_string());
            true
        }
    }

    pub fn is_answered(&self, question: &Question) -> bool {
        self.values.get(&question.id).is_some_and(AnswerValue::is_present)
    }

    pub fn progress(&self, questions: &[Question]) -> Progress {
        let answered = questions.iter().filter(|question| self.is_answered(question)).count();
        Progress {
            answered,
            unanswered: questions.len() - answered,
            flagged: self.flagged.len(),
            total: questions.len(),
        }
    }

    pub fn to_json_map(&self) -> BTreeMap<String, Value> {
        self.values.iter().map(|(id, value)| (id.clone(), value.to_json())).collect()
    }

    fn toggle_choice(&mut self, question_id: &str, option_id: String) {
        let mut selected = match self.values.remove(question_id) {
            Some(AnswerValue::Choices(ids)) => ids,
            Some(AnswerValue::Choice(id)) => vec![id],
            _ => Vec::new(),
        };
        if let Some(position) = selected.iter().position(|id| *id == option_id) {
            selected.remove(position);
        } else {
            selected.push(option_id);
        }
        self.put_or_remove(question_id, AnswerValue::Choices(selected));
    }

    fn put_or_remove(&mut self, question_id: &str, value: AnswerValue) {
        if value.is_present() {
            self.values.insert(question_id.to_string(), value);
        } else {
            self.values.remove(question_id);
        }
    }

    fn ensure_option(&self, question: &Question, option_id: &str) -> Result<(), SessionError> {
        if question.has_option(option_id) {
            return Ok(());
        }
        Err(SessionError::UnknownOption {
            question_id: question.id.clone(),
            option_id: option_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::exam::RawQuestion;

    fn question(value: Value) -> Question {
        let raw: RawQuestion = serde_json::from_value(value).expect("raw question");
        Question::from_raw(raw).expect("question")
    }

    fn multi() -> Question {
        question(json!({"id": "m", "type": "multiple_mcq", "options": ["red", "green", "blue"]}))
    }

    fn single() -> Question {
        question(json!({"id": "s", "type": "mcq", "options": [{"id": "o1", "text": "One"}, {"id": "o2", "text": "Two"}]}))
    }

    fn coding() -> Question {
        question(json!({"id": "c", "type": "coding", "allowed_languages": ["python", "rust"]}))
    }

    fn text() -> Question {
        question(json!({"id": "t", "type": "short_answer"}))
    }

    #[test]
    fn presence_rule_covers_every_shape() {
        assert!(!AnswerValue::Text("   ".to_string()).is_present());
        assert!(AnswerValue::Text(" x ".to_string()).is_present());
        assert!(!AnswerValue::Choices(vec![]).is_present());
        assert!(AnswerValue::Choices(vec!["a".to_string()]).is_present());
        assert!(!AnswerValue::Code(CodeAnswer { code: "\n\t".to_string(), language: None }).is_present());
        assert!(AnswerValue::Code(CodeAnswer { code: "x".to_string(), language: None }).is_present());
        assert!(AnswerValue::Choice("0".to_string()).is_present());
    }

    #[test]
    fn multi_select_toggle_is_self_inverse() {
        let question = multi();
        let mut store = AnswerStore::new();
        store.set(&question, AnswerValue::Choice("red".to_string())).expect("select red");
        let before = store.clone();

        store.set(&question, AnswerValue::Choice("blue".to_string())).expect("select blue");
        assert_eq!(store.get("m"), Some(&AnswerValue::Choices(vec!["red".to_string(), "blue".to_string()])));
        store.set(&question, AnswerValue::Choice("blue".to_string())).expect("deselect blue");
        assert_eq!(store, before);

        store.set(&question, AnswerValue::Choice("red".to_string())).expect("deselect red");
        assert_eq!(store.get("m"), None);
    }

    #[test]
    fn single_choice_overwrites_and_rejects_unknown_options() {
        let question = single();
        let mut store = AnswerStore::new();
        store.set(&question, AnswerValue::Choice("o1".to_string())).expect("o1");
        store.set(&question, AnswerValue::Choice("o2".to_string())).expect("o2");
        assert_eq!(store.get("s"), Some(&AnswerValue::Choice("o2".to_string())));

        let err = store.set(&question, AnswerValue::Choice("o9".to_string())).expect_err("unknown");
        assert!(matches!(err, SessionError::UnknownOption { .. }));
        assert_eq!(store.get("s"), Some(&AnswerValue::Choice("o2".to_string())));
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let mut store = AnswerStore::new();
        let err = store.set(&single(), AnswerValue::Text("o1".to_string())).expect_err("mismatch");
        assert_eq!(err, SessionError::ShapeMismatch { question_id: "s".to_string(), expected: "single choice" });
        assert!(store.values().is_empty());
    }

    #[test]
    fn clearing_differs_from_setting_empty() {
        let question = text();
        let mut store = AnswerStore::new();
        store.set(&question, AnswerValue::Text("draft".to_string())).expect("text");
        assert!(store.clear("t"));
        assert!(!store.clear("t"));

        store.set(&question, AnswerValue::Text("again".to_string())).expect("text");
        store.set(&question, AnswerValue::Text(String::new())).expect("empty");
        assert_eq!(store.get("t"), None);
    }

    #[test]
    fn language_change_keeps_code() {
        let question = coding();
        let mut store = AnswerStore::new();
        store.set_code(&question, "print(1)".to_string(), Some("python".to_string())).expect("code");
        store.set_language(&question, "rust".to_string()).expect("language");
        store.set_code(&question, "fn main() {}".to_string(), None).expect("code");

        assert_eq!(
            store.get("c"),
            Some(&AnswerValue::Code(CodeAnswer { code: "fn main() {}".to_string(), language: Some("rust".to_string()) }))
        );
    }

    #[test]
    fn progress_is_stable_without_mutation() {
        let questions = vec![single(), multi(), coding(), text()];
        let mut store = AnswerStore::new();
        store.set(&questions[0], AnswerValue::Choice("o1".to_string())).expect("single");
        store.set_code(&questions[2], "  ".to_string(), None).expect("blank code");
        store.toggle_flag("t");

        let first = store.progress(&questions);
        let second = store.progress(&questions);
        assert_eq!(first, second);
        assert_eq!(first, Progress { answered: 1, unanswered: 3, flagged: 1, total: 4 });
        assert_eq!(first.percent(), 25);
    }

    #[test]
    fn flags_are_independent_of_answers() {
        let mut store = AnswerStore::new();
        assert!(store.toggle_flag("s"));
        assert!(store.is_flagged("s"));
        assert!(!store.is_answered(&single()));
        assert!(!store.toggle_flag("s"));
        assert!(!store.is_flagged("s"));
    }

    #[test]
    fn stored_json_reads_back_per_shape() {
        assert_eq!(
            AnswerValue::from_json(AnswerShape::Code, &json!("print(2)")),
            Some(AnswerValue::Code(CodeAnswer { code: "print(2)".to_string(), language: None }))
        );
        assert_eq!(
            AnswerValue::from_json(AnswerShape::Choices, &json!("red")),
            Some(AnswerValue::Choices(vec!["red".to_string()]))
        );
        assert_eq!(AnswerValue::from_json(AnswerShape::Choices, &json!([])), None);
        assert_eq!(
            AnswerValue::from_json(AnswerShape::Choice, &json!(3)),
            Some(AnswerValue::Choice("3".to_string()))
        );
        assert_eq!(AnswerValue::from_json(AnswerShape::Text, &Value::Null), None);
    }

    #[test]
    fn wire_shapes_follow_question_type() {
        let code = AnswerValue::Code(CodeAnswer { code: "x = 1".to_string(), language: Some("python".to_string()) });
        assert_eq!(wire_answer(&QuestionType::Coding, Some(&code)), json!("x = 1"));
        assert_eq!(wire_answer(&QuestionType::Coding, None), json!(""));
        assert_eq!(wire_answer(&QuestionType::Mcq, None), Value::Null);
        assert_eq!(wire_answer(&QuestionType::MultipleChoice, None), json!([]));
        assert_eq!(
            wire_answer(&QuestionType::TrueFalse, Some(&AnswerValue::Choice("true".to_string()))),
            json!("true")
        );
        assert_eq!(wire_answer(&QuestionType::Descriptive, None), json!(""));
    }
}
