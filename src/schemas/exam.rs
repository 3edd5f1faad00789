use serde::Deserialize;
use serde_json::Value;

use super::{lenient_count, lenient_id, lenient_ids, lenient_number};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawExam {
    #[serde(deserialize_with = "lenient_id")]
    pub(crate) id: Option<String>,
    pub(crate) title: Option<String>,
    /// Declared duration in minutes.
    #[serde(deserialize_with = "lenient_number")]
    pub(crate) duration: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub(crate) total_marks: Option<f64>,
    pub(crate) exam_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawAttempt {
    #[serde(deserialize_with = "lenient_id")]
    pub(crate) attempt_id: Option<String>,
    #[serde(deserialize_with = "lenient_id")]
    pub(crate) id: Option<String>,
    pub(crate) questions: Option<Vec<RawQuestion>>,
    pub(crate) question_set: Option<Vec<RawQuestion>>,
    #[serde(deserialize_with = "lenient_number")]
    pub(crate) time_remaining_seconds: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub(crate) duration_seconds: Option<f64>,
    pub(crate) saved_answers: Option<Vec<RawSavedAnswer>>,
    pub(crate) answers: Option<Vec<RawSavedAnswer>>,
    #[serde(deserialize_with = "lenient_ids")]
    pub(crate) flagged: Option<Vec<String>>,
}

impl RawAttempt {
    pub(crate) fn resolved_id(&self) -> Option<String> {
        self.attempt_id.clone().or_else(|| self.id.clone())
    }

    pub(crate) fn take_questions(&mut self) -> Vec<RawQuestion> {
        self.questions.take().or_else(|| self.question_set.take()).unwrap_or_default()
    }

    pub(crate) fn take_saved_answers(&mut self) -> Vec<RawSavedAnswer> {
        self.saved_answers.take().or_else(|| self.answers.take()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawQuestion {
    #[serde(deserialize_with = "lenient_id")]
    pub(crate) id: Option<String>,
    #[serde(rename = "type")]
    pub(crate) kind: Option<String>,
    pub(crate) question_type: Option<String>,
    pub(crate) text: Option<String>,
    pub(crate) question_text: Option<String>,
    pub(crate) body: Option<String>,
    pub(crate) image: Option<String>,
    pub(crate) image_url: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub(crate) points: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub(crate) marks: Option<f64>,
    pub(crate) section: Option<String>,
    pub(crate) options: Option<Vec<Value>>,
    pub(crate) choices: Option<Vec<Value>>,
    #[serde(deserialize_with = "lenient_count")]
    pub(crate) max_length: Option<u64>,
    #[serde(deserialize_with = "lenient_count")]
    pub(crate) word_limit: Option<u64>,
    pub(crate) allowed_languages: Option<Vec<String>>,
    pub(crate) languages: Option<Vec<String>>,
    pub(crate) starter_code: Option<String>,
    pub(crate) boilerplate: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawSavedAnswer {
    #[serde(deserialize_with = "lenient_id")]
    pub(crate) question_id: Option<String>,
    #[serde(deserialize_with = "lenient_id")]
    pub(crate) question: Option<String>,
    pub(crate) answer: Option<Value>,
    pub(crate) response: Option<Value>,
    pub(crate) selected_option: Option<Value>,
}

impl RawSavedAnswer {
    /// `(question id, stored value)` with the first non-null value field winning.
    pub(crate) fn into_entry(self) -> Option<(String, Value)> {
        let question_id = self.question_id.or(self.question)?;
        let value = self.answer.or(self.response).or(self.selected_option)?;
        Some((question_id, value))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn attempt_accepts_alternate_field_names() {
        let mut attempt: RawAttempt = serde_json::from_value(json!({
            "id": 17,
            "question_set": [{"id": 5, "question_type": "single_choice", "points": 2}],
            "answers": [{"question": 5, "response": "b"}],
            "duration_seconds": 900,
            "flagged": [5, "7"]
        }))
        .expect("attempt");

        assert_eq!(attempt.resolved_id().as_deref(), Some("17"));
        assert_eq!(attempt.flagged, Some(vec!["5".to_string(), "7".to_string()]));
        let questions = attempt.take_questions();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id.as_deref(), Some("5"));
        let answers = attempt.take_saved_answers();
        assert_eq!(answers[0].clone().into_entry(), Some(("5".to_string(), json!("b"))));
    }

    #[test]
    fn saved_answer_skips_null_values() {
        let saved: RawSavedAnswer = serde_json::from_value(json!({
            "question_id": "q1",
            "answer": null,
            "selected_option": "o2"
        }))
        .expect("saved answer");
        assert_eq!(saved.into_entry(), Some(("q1".to_string(), json!("o2"))));

        let orphan: RawSavedAnswer =
            serde_json::from_value(json!({"answer": "x"})).expect("saved answer");
        assert_eq!(orphan.into_entry(), None);
    }

    #[test]
    fn numeric_fields_accept_decimal_strings() {
        let exam: RawExam = serde_json::from_value(json!({
            "id": 42,
            "duration": "60",
            "total_marks": "100.00"
        }))
        .expect("exam");
        assert_eq!(exam.duration, Some(60.0));
        assert_eq!(exam.total_marks, Some(100.0));

        let question: RawQuestion = serde_json::from_value(json!({
            "id": "q1",
            "points": "2.00",
            "marks": "lots",
            "max_length": "250",
            "word_limit": -3
        }))
        .expect("question");
        assert_eq!(question.points, Some(2.0));
        assert_eq!(question.marks, None);
        assert_eq!(question.max_length, Some(250));
        assert_eq!(question.word_limit, None);

        let attempt: RawAttempt = serde_json::from_value(json!({
            "time_remaining_seconds": " 90 ",
            "duration_seconds": {"minutes": 15}
        }))
        .expect("attempt");
        assert_eq!(attempt.time_remaining_seconds, Some(90.0));
        assert_eq!(attempt.duration_seconds, None);
    }
}
