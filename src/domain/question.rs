use serde_json::Value;

use crate::schemas::exam::RawQuestion;
use crate::schemas::id_string;

const DEFAULT_LANGUAGES: [&str; 5] = ["python", "javascript", "java", "cpp", "c"];
const OPTION_KEYS: [&str; 6] = ["A", "B", "C", "D", "E", "F"];

/// Canonical question kinds. Backend vocabularies are folded into these at load time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuestionType {
    Mcq,
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    LongAnswer,
    Descriptive,
    Coding,
    /// A lower-cased type string the table does not know. Rendered as free text.
    Unrecognized(String),
}

/// How an answer for a question is held in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerShape {
    Choice,
    Choices,
    Text,
    Code,
}

impl AnswerShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Choice => "single choice",
            Self::Choices => "multiple choice",
            Self::Text => "text",
            Self::Code => "code",
        }
    }
}

impl QuestionType {
    /// Missing types default to `mcq`; unknown ones are kept verbatim and logged.
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::Mcq;
        };
        let lowered = raw.to_lowercase();
        match lowered.as_str() {
            "mcq" | "single_choice" => Self::Mcq,
            "multiple_choice" | "multiple_mcq" => Self::MultipleChoice,
            "true_false" => Self::TrueFalse,
            "short_answer" => Self::ShortAnswer,
            "long_answer" => Self::LongAnswer,
            "descriptive" => Self::Descriptive,
            "coding" => Self::Coding,
            _ => {
                tracing::warn!(question_type = %raw, "Unrecognized question type; treating as free text");
                Self::Unrecognized(lowered)
            }
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Mcq => "mcq",
            Self::MultipleChoice => "multiple_choice",
            Self::TrueFalse => "true_false",
            Self::ShortAnswer => "short_answer",
            Self::LongAnswer => "long_answer",
            Self::Descriptive => "descriptive",
            Self::Coding => "coding",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Badge text shown next to the question number.
    pub fn label(&self) -> &str {
        match self {
            Self::Mcq => "MCQ",
            Self::MultipleChoice => "Multi-Select",
            Self::TrueFalse => "True / False",
            Self::ShortAnswer => "Short Answer",
            Self::LongAnswer => "Long Answer",
            Self::Descriptive => "Descriptive",
            Self::Coding => "Coding",
            Self::Unrecognized(raw) => raw,
        }
    }

    pub fn answer_shape(&self) -> AnswerShape {
        match self {
            Self::Mcq | Self::TrueFalse => AnswerShape::Choice,
            Self::MultipleChoice => AnswerShape::Choices,
            Self::Coding => AnswerShape::Code,
            Self::ShortAnswer | Self::LongAnswer | Self::Descriptive | Self::Unrecognized(_) => {
                AnswerShape::Text
            }
        }
    }

    pub fn is_canonical(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Descriptive | Self::LongAnswer => "Write your detailed answer here…",
            _ => "Type your short answer here…",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOption {
    pub id: String,
    pub text: String,
}

impl ChoiceOption {
    /// Accepts a bare string or an object with `text`/`label`/`value` and `id`/`value`.
    pub fn coerce(raw: &Value) -> Option<Self> {
        match raw {
            Value::Object(map) => {
                let text = ["text", "label", "value"]
                    .iter()
                    .filter_map(|key| map.get(*key))
                    .find_map(id_string)
                    .unwrap_or_default();
                let id = ["id", "value"]
                    .iter()
                    .filter_map(|key| map.get(*key))
                    .find_map(id_string)
                    .unwrap_or_else(|| text.clone());
                if id.is_empty() {
                    return None;
                }
                Some(Self { id, text })
            }
            Value::Null => None,
            other => id_string(other).map(|text| Self { id: text.clone(), text }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: String,
    pub kind: QuestionType,
    pub text: String,
    pub marks: f64,
    pub section: Option<String>,
    pub image: Option<String>,
    pub options: Vec<ChoiceOption>,
    pub max_length: Option<u64>,
    pub languages: Vec<String>,
    pub starter_code: String,
}

impl Question {
    /// Returns `None` for entries without an identifier.
    pub(crate) fn from_raw(raw: RawQuestion) -> Option<Self> {
        let id = raw.id?;
        let kind = QuestionType::normalize(raw.kind.as_deref().or(raw.question_type.as_deref()));

        let options = match kind {
            QuestionType::TrueFalse => vec![
                ChoiceOption { id: "true".to_string(), text: "True".to_string() },
                ChoiceOption { id: "false".to_string(), text: "False".to_string() },
            ],
            _ => raw
                .options
                .or(raw.choices)
                .unwrap_or_default()
                .iter()
                .filter_map(ChoiceOption::coerce)
                .collect(),
        };

        let languages = raw
            .allowed_languages
            .or(raw.languages)
            .filter(|languages| !languages.is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGES.iter().map(ToString::to_string).collect());

        Some(Self {
            id,
            kind,
            text: raw.text.or(raw.question_text).or(raw.body).unwrap_or_default(),
            marks: raw.points.or(raw.marks).unwrap_or(0.0),
            section: raw.section.filter(|section| !section.trim().is_empty()),
            image: raw.image.or(raw.image_url),
            options,
            max_length: raw.max_length.or(raw.word_limit).filter(|limit| *limit > 0),
            languages,
            starter_code: raw.starter_code.or(raw.boilerplate).unwrap_or_default(),
        })
    }

    pub fn shape(&self) -> AnswerShape {
        self.kind.answer_shape()
    }

    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|option| option.id == option_id)
    }

    pub fn default_language(&self) -> &str {
        self.languages.first().map(String::as_str).unwrap_or("python")
    }

    pub fn marks_label(&self) -> String {
        let marks = if self.marks.fract() == 0.0 {
            format!("{}", self.marks as i64)
        } else {
            self.marks.to_string()
        };
        if self.marks == 1.0 {
            format!("{marks} mark")
        } else {
            format!("{marks} marks")
        }
    }

    /// Counter shown under text answers.
    pub fn char_count_label(&self, text: &str) -> String {
        let count = text.chars().count();
        match self.max_length {
            Some(max) => format!("{count} / {max}"),
            None => format!("{count} chars"),
        }
    }
}

/// Display key for the option at `index`: `A`..`F`, then its 1-based position.
pub fn option_key(index: usize) -> String {
    OPTION_KEYS.get(index).map(ToString::to_string).unwrap_or_else(|| (index + 1).to_string())
}
