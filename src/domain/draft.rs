use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::answer::AnswerStore;
use super::errors::StorageError;

pub fn draft_key(exam_id: &str) -> String {
    format!("tv_exam_draft_{exam_id}")
}

/// Local snapshot of an attempt, stored as `{answers, flagged, savedAt, attemptId}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Draft {
    pub answers: BTreeMap<String, Value>,
    pub flagged: Vec<String>,
    pub saved_at: i64,
    pub attempt_id: Option<String>,
}

impl Draft {
    pub fn capture(store: &AnswerStore, attempt_id: &str, saved_at: i64) -> Self {
        Self {
            answers: store.to_json_map(),
            flagged: store.flagged().iter().cloned().collect(),
            saved_at,
            attempt_id: Some(attempt_id.to_string()),
        }
    }

    pub fn encode(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, StorageError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// A draft written for another attempt must not leak into this one.
    pub fn belongs_to(&self, attempt_id: &str) -> bool {
        self.attempt_id.as_deref().map_or(true, |stored| stored == attempt_id)
    }
}

/// Which copy wins when the server and the local draft both hold an answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DraftPrecedence {
    /// Server value wins per key; the draft only fills gaps.
    #[default]
    ServerFirst,
    /// Draft value wins per key.
    LocalFirst,
}

impl DraftPrecedence {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "server" | "server_first" => Some(Self::ServerFirst),
            "local" | "local_first" => Some(Self::LocalFirst),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServerFirst => "server",
            Self::LocalFirst => "local",
        }
    }
}

pub fn merge_answers<V: Clone>(
    server: &BTreeMap<String, V>,
    local: &BTreeMap<String, V>,
    precedence: DraftPrecedence,
) -> BTreeMap<String, V> {
    let (base, overlay) = match precedence {
        DraftPrecedence::ServerFirst => (local, server),
        DraftPrecedence::LocalFirst => (server, local),
    };
    let mut merged = base.clone();
    merged.extend(overlay.iter().map(|(key, value)| (key.clone(), value.clone())));
    merged
}

/// Synchronous key-value storage for drafts.
pub trait DraftStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    dir: PathBuf,
}

impl FileDraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' { ch } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl DraftStore for FileDraftStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        atomic_write(&self.path_for(key), value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn atomic_write(path: &Path, content: &str) -> Result<(), StorageError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// In-process store with an optional byte quota across all entries.
#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self { entries: Mutex::new(HashMap::new()), quota: Some(quota) }
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.entries.lock().map_err(|_| StorageError::Unavailable("draft store lock poisoned".to_string()))
    }
}

impl DraftStore for MemoryDraftStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries()?;
        if let Some(quota) = self.quota {
            let used: usize = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, stored)| existing.len() + stored.len())
                .sum();
            let needed = key.len() + value.len();
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(StorageError::QuotaExceeded { needed, available });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, Value> {
        entries.iter().map(|(key, value)| (key.to_string(), json!(value))).collect()
    }

    #[test]
    fn server_first_keeps_server_values_and_fills_gaps() {
        let server = map(&[("q1", "server")]);
        let local = map(&[("q1", "local"), ("q2", "local")]);

        let merged = merge_answers(&server, &local, DraftPrecedence::ServerFirst);
        assert_eq!(merged, map(&[("q1", "server"), ("q2", "local")]));
    }

    #[test]
    fn local_first_overrides_server_values() {
        let server = map(&[("q1", "server"), ("q3", "server")]);
        let local = map(&[("q1", "local")]);

        let merged = merge_answers(&server, &local, DraftPrecedence::LocalFirst);
        assert_eq!(merged, map(&[("q1", "local"), ("q3", "server")]));
    }

    #[test]
    fn draft_uses_browser_field_names() {
        let draft = Draft {
            answers: map(&[("q1", "o1")]),
            flagged: vec!["q2".to_string()],
            saved_at: 1_700_000_000_000,
            attempt_id: Some("a-1".to_string()),
        };

        let encoded: Value = serde_json::from_str(&draft.encode().expect("encode")).expect("json");
        assert_eq!(
            encoded,
            json!({"answers": {"q1": "o1"}, "flagged": ["q2"], "savedAt": 1_700_000_000_000_i64, "attemptId": "a-1"})
        );
        assert_eq!(Draft::decode(&encoded.to_string()).expect("decode"), draft);
    }

    #[test]
    fn drafts_without_attempt_belong_to_any_attempt() {
        let legacy = Draft::decode(r#"{"answers": {"q1": "x"}}"#).expect("decode");
        assert!(legacy.belongs_to("a-1"));

        let scoped = Draft { attempt_id: Some("a-1".to_string()), ..Draft::default() };
        assert!(scoped.belongs_to("a-1"));
        assert!(!scoped.belongs_to("a-2"));
    }

    #[test]
    fn memory_store_enforces_quota() {
        let store = MemoryDraftStore::with_quota(40);
        store.set("k", "small").expect("fits");
        let err = store.set("k2", &"x".repeat(64)).expect_err("too large");
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));

        // Replacing an entry only counts the new value.
        store.set("k", &"y".repeat(30)).expect("replace");
        assert_eq!(store.get("k").expect("get").map(|value| value.len()), Some(30));
    }

    #[test]
    fn file_store_writes_reads_and_removes() {
        let dir = std::env::temp_dir().join(format!("testverse_drafts_{}", uuid::Uuid::new_v4()));
        let store = FileDraftStore::new(&dir);
        let key = draft_key("exam/7");
        assert_eq!(store.dir(), dir.as_path());

        assert_eq!(store.get(&key).expect("missing"), None);
        store.set(&key, r#"{"answers":{}}"#).expect("write");
        assert_eq!(store.get(&key).expect("read").as_deref(), Some(r#"{"answers":{}}"#));
        assert!(dir.join("tv_exam_draft_exam_7.json").exists());
        assert!(!dir.join("tv_exam_draft_exam_7.tmp").exists());

        store.remove(&key).expect("remove");
        store.remove(&key).expect("remove twice");
        assert_eq!(store.get(&key).expect("gone"), None);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn precedence_names() {
        assert_eq!(DraftPrecedence::parse("Server"), Some(DraftPrecedence::ServerFirst));
        assert_eq!(DraftPrecedence::parse("local_first"), Some(DraftPrecedence::LocalFirst));
        assert_eq!(DraftPrecedence::parse("newest"), None);
        assert_eq!(DraftPrecedence::default().as_str(), "server");
    }
}
