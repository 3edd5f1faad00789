use crate::domain::question::QuestionType;

/// Where keyboard focus sits when a key is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Page,
    TextField,
    CodeEditor,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyPress {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
    pub focus: Focus,
}

impl KeyPress {
    pub fn new(key: &str) -> Self {
        Self { key: key.to_string(), ..Self::default() }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn in_focus(mut self, focus: Focus) -> Self {
        self.focus = focus;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Next,
    Previous,
    ToggleFlag,
    ManualSave,
    /// Zero-based option position on a single-choice question.
    SelectOption(usize),
}

pub fn resolve(press: &KeyPress, current: Option<&QuestionType>) -> Option<Shortcut> {
    let modified = press.ctrl || press.meta;
    if modified && press.key.eq_ignore_ascii_case("s") {
        return match press.focus {
            Focus::Page | Focus::CodeEditor => Some(Shortcut::ManualSave),
            Focus::TextField => None,
        };
    }
    if press.focus != Focus::Page || modified {
        return None;
    }

    match press.key.as_str() {
        "ArrowRight" | "d" => Some(Shortcut::Next),
        "ArrowLeft" | "a" => Some(Shortcut::Previous),
        "f" | "F" => Some(Shortcut::ToggleFlag),
        digit if digit.len() == 1 && matches!(current, Some(QuestionType::Mcq)) => {
            let position = digit.parse::<usize>().ok().filter(|n| (1..=9).contains(n))?;
            Some(Shortcut::SelectOption(position - 1))
        }
        _ => None,
    }
}
