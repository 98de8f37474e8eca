//! One JSON document per session in a local directory.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use psytest_core::error::MirrorError;
use psytest_core::mirror::{parse_document, MirrorStore};
use psytest_core::model::TestKind;

const EXTENSION: &str = "json";

/// Mirror backend storing `{key}.json` files under a directory.
///
/// Writes go to a temporary file in the same directory and are renamed over
/// the target, so a crash never leaves a half-written document behind.
#[derive(Debug, Clone)]
pub struct FileMirror {
    dir: PathBuf,
}

/// A session mirror found on disk.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub key: String,
    pub kind: TestKind,
    pub token: String,
    pub answered: usize,
    pub modified: Option<DateTime<Utc>>,
}

impl FileMirror {
    /// Use `dir` as the mirror directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, MirrorError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            MirrorError::Backend(format!("failed to create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document stored under `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", encode_key(key)))
    }

    /// Every readable session mirror in the directory, sorted by key.
    ///
    /// Unreadable or foreign files are skipped with a warning.
    pub fn list(&self) -> Result<Vec<StoredSession>, MirrorError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            MirrorError::Backend(format!("failed to read {}: {e}", self.dir.display()))
        })?;

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_key)
            else {
                continue;
            };

            let document = match std::fs::read_to_string(&path)
                .map_err(|e| MirrorError::Backend(e.to_string()))
                .and_then(|raw| parse_document(&raw))
            {
                Ok(document) => document,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping mirror: {e}");
                    continue;
                }
            };

            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);

            sessions.push(StoredSession {
                key,
                kind: document.test,
                token: document.token,
                answered: document.entries.len(),
                modified,
            });
        }

        sessions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(sessions)
    }
}

impl MirrorStore for FileMirror {
    fn load(&self, key: &str) -> Result<Option<String>, MirrorError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MirrorError::Backend(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    fn save(&self, key: &str, document: &str) -> Result<(), MirrorError> {
        let path = self.path_for(key);
        let backend = |e: std::io::Error| {
            MirrorError::Backend(format!("failed to write {}: {e}", path.display()))
        };

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(backend)?;
        tmp.write_all(document.as_bytes()).map_err(backend)?;
        tmp.as_file().sync_all().map_err(backend)?;
        tmp.persist(&path).map_err(|e| backend(e.error))?;

        tracing::debug!(path = %path.display(), bytes = document.len(), "mirror saved");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MirrorError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MirrorError::Backend(format!(
                "failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}

/// Percent-encode every byte outside `[A-Za-z0-9._-]`.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => out.push(byte as char),
            // A leading dot would hide the file.
            b'.' if !out.is_empty() => out.push('.'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn decode_key(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
