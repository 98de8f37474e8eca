//! Persistent local mirror of an answer store.
//!
//! The mirror is an injected key/value backend holding one document per
//! session, keyed `{test}_{token}`. Documents are versioned JSON with an
//! explicit entry list so any client can read them back.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::model::{Answer, AnswerEntry, TestKind};

/// Current mirror document format.
pub const MIRROR_VERSION: u32 = 1;

/// Key/value backend for mirror documents.
///
/// Writes must be durable when `save` returns; the engine never batches.
pub trait MirrorStore: Send + Sync {
    /// Read the document stored under `key`.
    fn load(&self, key: &str) -> Result<Option<String>, MirrorError>;

    /// Replace the document stored under `key`.
    fn save(&self, key: &str, document: &str) -> Result<(), MirrorError>;

    /// Delete the document under `key`. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), MirrorError>;
}

/// Storage key of a session mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MirrorKey {
    pub kind: TestKind,
    pub token: String,
}

impl MirrorKey {
    pub fn new(kind: TestKind, token: impl Into<String>) -> Self {
        Self {
            kind,
            token: token.into(),
        }
    }
}

impl fmt::Display for MirrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.token)
    }
}

/// On-disk shape of a mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorDocument {
    pub version: u32,
    pub test: TestKind,
    pub token: String,
    #[serde(default)]
    pub entries: Vec<AnswerEntry>,
}

/// Answers recovered from a mirror, plus the entries that had to be dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecodedMirror {
    pub answers: BTreeMap<u32, Answer>,
    pub dropped: Vec<u32>,
}

/// Serialize the full answer mapping.
pub fn encode(key: &MirrorKey, answers: &BTreeMap<u32, Answer>) -> Result<String, MirrorError> {
    let document = MirrorDocument {
        version: MIRROR_VERSION,
        test: key.kind,
        token: key.token.clone(),
        entries: answers
            .iter()
            .map(|(&question, answer)| AnswerEntry {
                question,
                answer: answer.clone(),
            })
            .collect(),
    };
    serde_json::to_string(&document).map_err(|e| MirrorError::Corrupt(e.to_string()))
}

/// Parse a mirror document without validating its entries.
pub fn parse_document(raw: &str) -> Result<MirrorDocument, MirrorError> {
    let document: MirrorDocument =
        serde_json::from_str(raw).map_err(|e| MirrorError::Corrupt(e.to_string()))?;
    if document.version != MIRROR_VERSION {
        return Err(MirrorError::UnsupportedVersion {
            found: document.version,
            expected: MIRROR_VERSION,
        });
    }
    Ok(document)
}

/// Decode a mirror for `kind`.
///
/// Entries that fail the answer validity predicate, or name a question
/// outside the questionnaire, are dropped. A repeated question number means
/// the document cannot be trusted and is rejected as a whole.
pub fn decode(kind: TestKind, raw: &str) -> Result<DecodedMirror, MirrorError> {
    let document = parse_document(raw)?;
    if document.test != kind {
        return Err(MirrorError::KindMismatch {
            expected: kind,
            found: document.test,
        });
    }

    let max = kind.question_count() as u32;
    let mut decoded = DecodedMirror::default();
    for entry in document.entries {
        let in_range = (1..=max).contains(&entry.question);
        if !in_range || !entry.answer.fits(kind) || !entry.answer.is_valid() {
            decoded.dropped.push(entry.question);
            continue;
        }
        if decoded.answers.insert(entry.question, entry.answer).is_some() {
            return Err(MirrorError::Corrupt(format!(
                "question {} appears twice",
                entry.question
            )));
        }
    }
    Ok(decoded)
}

/// In-memory mirror backend.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    documents: Mutex<HashMap<String, String>>,
    writes: AtomicU32,
    fail_writes: AtomicBool,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a raw document, e.g. to simulate a corrupt mirror.
    pub fn with_document(self, key: &str, document: &str) -> Self {
        self.lock().insert(key.to_string(), document.to_string());
        self
    }

    /// Raw document under `key`.
    pub fn document(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    /// Number of successful `save` calls.
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Make subsequent `save` calls fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MirrorStore for MemoryMirror {
    fn load(&self, key: &str) -> Result<Option<String>, MirrorError> {
        Ok(self.lock().get(key).cloned())
    }

    fn save(&self, key: &str, document: &str) -> Result<(), MirrorError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(MirrorError::Backend("storage quota exceeded".into()));
        }
        self.lock().insert(key.to_string(), document.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MirrorError> {
        self.lock().remove(key);
        Ok(())
    }
}
