//! Answer store with synchronous mirroring.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{MirrorError, SessionError};
use crate::mirror::{self, MirrorKey, MirrorStore};
use crate::model::{Answer, AnswerEntry, TestKind};

/// What `set` did with the answer it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The answer is now stored.
    Stored,
    /// The answer failed validation; the question is now unanswered.
    Reverted,
}

/// Question number → answer, mirrored to a [`MirrorStore`] after every
/// mutation.
pub struct AnswerStore {
    key: MirrorKey,
    answers: BTreeMap<u32, Answer>,
    mirror: Arc<dyn MirrorStore>,
    dirty: bool,
}

impl AnswerStore {
    /// Open the store for `kind`/`token`, seeding it from any prior mirror.
    ///
    /// A mirror that cannot be read or decoded is logged and ignored.
    pub fn open(kind: TestKind, token: &str, mirror: Arc<dyn MirrorStore>) -> Self {
        let key = MirrorKey::new(kind, token);
        let answers = match mirror.load(&key.to_string()) {
            Ok(Some(raw)) => match mirror::decode(kind, &raw) {
                Ok(decoded) => {
                    if !decoded.dropped.is_empty() {
                        tracing::warn!(
                            key = %key,
                            dropped = ?decoded.dropped,
                            "dropped invalid mirror entries"
                        );
                    }
                    tracing::info!(key = %key, restored = decoded.answers.len(), "mirror restored");
                    decoded.answers
                }
                Err(e) => {
                    tracing::warn!(key = %key, "ignoring local mirror: {e}");
                    BTreeMap::new()
                }
            },
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(key = %key, "could not read local mirror: {e}");
                BTreeMap::new()
            }
        };

        Self {
            key,
            answers,
            mirror,
            dirty: false,
        }
    }

    pub fn kind(&self) -> TestKind {
        self.key.kind
    }

    pub fn key(&self) -> &MirrorKey {
        &self.key
    }

    pub fn get(&self, question: u32) -> Option<&Answer> {
        self.answers.get(&question)
    }

    pub fn contains(&self, question: u32) -> bool {
        self.answers.contains_key(&question)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Store `answer` for `question`.
    ///
    /// An answer failing its validity predicate (an incomplete ranking)
    /// deletes the question instead.
    pub fn set(&mut self, question: u32, answer: Answer) -> Result<StoreOutcome, SessionError> {
        self.check_question(question)?;
        if !answer.fits(self.kind()) {
            return Err(SessionError::AnswerKindMismatch {
                question,
                expected: self.kind(),
            });
        }

        if !answer.is_valid() {
            tracing::debug!(question, "incomplete answer, reverting to unanswered");
            self.delete(question)?;
            return Ok(StoreOutcome::Reverted);
        }

        let changed = self.answers.get(&question) != Some(&answer);
        self.answers.insert(question, answer);
        if changed || self.dirty {
            self.persist();
        }
        Ok(StoreOutcome::Stored)
    }

    /// Remove the answer for `question`. Returns whether one was present.
    pub fn delete(&mut self, question: u32) -> Result<bool, SessionError> {
        self.check_question(question)?;
        let removed = self.answers.remove(&question).is_some();
        if removed || self.dirty {
            self.persist();
        }
        Ok(removed)
    }

    /// All answers ascending by question number.
    pub fn to_ordered_list(&self) -> Vec<AnswerEntry> {
        self.answers
            .iter()
            .map(|(&question, answer)| AnswerEntry {
                question,
                answer: answer.clone(),
            })
            .collect()
    }

    /// `true` while the last mirror write failed and has not been retried.
    pub fn mirror_dirty(&self) -> bool {
        self.dirty
    }

    /// Delete the persisted mirror. In-memory answers are kept.
    pub fn discard_mirror(&mut self) -> Result<(), MirrorError> {
        self.mirror.remove(&self.key.to_string())?;
        self.dirty = false;
        tracing::info!(key = %self.key, "local mirror cleared");
        Ok(())
    }

    fn check_question(&self, question: u32) -> Result<(), SessionError> {
        let max = self.kind().question_count() as u32;
        if (1..=max).contains(&question) {
            Ok(())
        } else {
            Err(SessionError::UnknownQuestion(question))
        }
    }

    /// Write the full mapping. Failures mark the store dirty so the next
    /// mutation rewrites everything.
    fn persist(&mut self) {
        let result = mirror::encode(&self.key, &self.answers)
            .and_then(|doc| self.mirror.save(&self.key.to_string(), &doc));
        match result {
            Ok(()) => self.dirty = false,
            Err(e) => {
                tracing::warn!(key = %self.key, "mirror write failed: {e}");
                self.dirty = true;
            }
        }
    }
}

impl std::fmt::Debug for AnswerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerStore")
            .field("key", &self.key.to_string())
            .field("answered", &self.answers.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}
