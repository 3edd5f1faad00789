use std::sync::{Arc, Mutex, PoisonError};

/// Narrow view of an external code editor widget. The session only reads and replaces its
/// contents; the widget's own lifecycle stays with the host.
pub trait EditorHandle: Send {
    fn value(&self) -> String;

    fn set_value(&mut self, value: &str);

    /// Language currently selected in the widget, when it tracks one.
    fn language(&self) -> Option<String> {
        None
    }

    fn set_language(&mut self, _editor_language: &str) {}
}

#[derive(Debug, Default)]
struct Buffer {
    text: String,
    language: Option<String>,
}

/// Shared text buffer. Clones observe the same contents, so a host can keep one half
/// and hand the other to the session.
#[derive(Debug, Clone, Default)]
pub struct BufferEditor {
    buffer: Arc<Mutex<Buffer>>,
}

impl BufferEditor {
    pub fn new(text: &str) -> Self {
        let editor = Self::default();
        editor.type_text(text);
        editor
    }

    /// Host-side edit that the session has not been told about yet.
    pub fn type_text(&self, text: &str) {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).text = text.to_string();
    }

    pub fn editor_language(&self) -> Option<String> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).language.clone()
    }
}

impl EditorHandle for BufferEditor {
    fn value(&self) -> String {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).text.clone()
    }

    fn set_value(&mut self, value: &str) {
        self.type_text(value);
    }

    fn set_language(&mut self, editor_language: &str) {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).language =
            Some(editor_language.to_string());
    }
}
