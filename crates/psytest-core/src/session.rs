//! The runtime session aggregate.
//!
//! A `Session` owns the questions, the answer store, the countdown and the
//! current position. Candidate input arrives as [`SessionEvent`]s through
//! [`Session::apply`]; the countdown is read with [`Session::countdown`],
//! which is also where expiry is observed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::clock::{Clock, ClockSync, Countdown};
use crate::error::{LoadError, SessionError};
use crate::mirror::MirrorStore;
use crate::model::{normalize_questions, Answer, Choice, Question, SessionState, TestKind};
use crate::ranking::{reduce_ranking, Letter, RankEdit, Ranking};
use crate::store::{AnswerStore, StoreOutcome};
use crate::tracker::{CompletenessTracker, QuestionStatus};
use crate::traits::{QuestionSource, SessionBundle};

/// Candidate input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Select a 16PF option.
    Choose { question: u32, choice: Choice },
    /// Give a CMT letter a rank, swapping with its current holder.
    Rank {
        question: u32,
        letter: Letter,
        rank: u8,
    },
    /// Remove a CMT letter's rank.
    Unrank { question: u32, letter: Letter },
    Next,
    Previous,
    /// Jump to a 0-based position.
    GoTo(usize),
    /// Jump to the first question of a 0-based page.
    GoToPage(usize),
}

/// What an accepted event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The question now holds a valid answer.
    Answered(u32),
    /// The question is unanswered after the edit.
    Unanswered(u32),
    /// The current position after navigation.
    Moved(usize),
}

/// How long after observing expiry the final submission may still start.
pub const FINAL_ATTEMPT_WINDOW_SECS: i64 = 5;

/// The single submission allowed after the deadline.
///
/// Only [`Session::take_final_attempt`] hands one out, and only to the
/// caller that saw the session expire.
#[derive(Debug)]
#[must_use]
pub struct FinalAttempt {
    _private: (),
}

/// One candidate's run through a questionnaire.
pub struct Session {
    kind: TestKind,
    token: String,
    questions: Vec<Question>,
    store: AnswerStore,
    tracker: CompletenessTracker,
    clock: ClockSync,
    state: SessionState,
    position: usize,
    /// Partial CMT rankings still being edited. Never persisted.
    drafts: BTreeMap<u32, Ranking>,
    /// Local time at which this session saw its own deadline pass. Never
    /// set for a deadline that had already passed when the session loaded.
    expiry_observed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Fetch questions and deadline for `token` and build the session.
    pub async fn load(
        kind: TestKind,
        token: &str,
        source: &dyn QuestionSource,
        mirror: Arc<dyn MirrorStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LoadError> {
        let bundle = source.fetch(kind, token).await?;
        Self::from_bundle(kind, token, bundle, mirror, clock)
    }

    /// Build a session from an already fetched bundle.
    pub fn from_bundle(
        kind: TestKind,
        token: &str,
        bundle: SessionBundle,
        mirror: Arc<dyn MirrorStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LoadError> {
        let questions = normalize_questions(kind, bundle.questions)?;
        let mut store = AnswerStore::open(kind, token, mirror);
        let tracker = CompletenessTracker::new(kind);
        let mut sync = ClockSync::new(&bundle.deadline, clock);
        let state = bundle.deadline.state;

        if state == SessionState::Completed && !store.is_empty() {
            // The server already holds the answers; the leftover mirror is stale.
            if let Err(e) = store.discard_mirror() {
                tracing::warn!("failed to clear stale mirror: {e}");
            }
        }
        if state.is_terminal() {
            sync.close(state);
        }

        let position = tracker
            .missing(&store)
            .first()
            .map(|&n| n as usize - 1)
            .unwrap_or(questions.len() - 1);

        tracing::info!(
            test = %kind,
            state = %state,
            restored = store.len(),
            position,
            "session loaded"
        );

        let mut session = Self {
            kind,
            token: token.to_string(),
            questions,
            store,
            tracker,
            clock: sync,
            state,
            position,
            drafts: BTreeMap::new(),
            expiry_observed_at: None,
        };
        session.observe(false);
        Ok(session)
    }

    pub fn kind(&self) -> TestKind {
        self.kind
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn question(&self, number: u32) -> Option<&Question> {
        number
            .checked_sub(1)
            .and_then(|idx| self.questions.get(idx as usize))
    }

    /// 0-based index of the current question. Always within `0..N`.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.position]
    }

    pub fn store(&self) -> &AnswerStore {
        &self.store
    }

    pub fn tracker(&self) -> &CompletenessTracker {
        &self.tracker
    }

    pub fn answered_count(&self) -> usize {
        self.tracker.answered_count(&self.store)
    }

    pub fn is_complete(&self) -> bool {
        self.tracker.is_complete(&self.store)
    }

    pub fn status_of(&self, number: u32) -> QuestionStatus {
        self.tracker.status_of(&self.store, number)
    }

    pub fn is_current_page(&self, number: u32) -> bool {
        self.tracker.is_current_page(number, self.position)
    }

    pub fn is_highlighted(&self, number: u32) -> bool {
        self.tracker.is_highlighted(&self.store, number)
    }

    pub fn missing(&self) -> Vec<u32> {
        self.tracker.missing(&self.store)
    }

    /// Selected 16PF option for `number`.
    pub fn choice_of(&self, number: u32) -> Option<Choice> {
        match self.store.get(number) {
            Some(Answer::Choice(choice)) => Some(*choice),
            _ => None,
        }
    }

    /// Working ranking for `number`: the in-progress draft if any, else the
    /// stored answer.
    pub fn ranking_of(&self, number: u32) -> Option<&Ranking> {
        self.drafts
            .get(&number)
            .or_else(|| match self.store.get(number) {
                Some(Answer::Ranking(ranking)) => Some(ranking),
                _ => None,
            })
    }

    /// Read the countdown and observe expiry.
    ///
    /// The first reading at or past the deadline moves a started session to
    /// `EXPIRED` and arms its single final submission attempt.
    pub fn countdown(&mut self) -> Countdown {
        self.observe(true)
    }

    fn observe(&mut self, arm: bool) -> Countdown {
        let countdown = self.clock.remaining();
        if self.state == SessionState::Started && countdown.is_elapsed() {
            self.state = SessionState::Expired;
            self.clock.close(SessionState::Expired);
            if arm {
                self.expiry_observed_at = Some(self.clock.local_now());
            }
            tracing::info!(
                test = %self.kind,
                answered = self.store.len(),
                "time limit reached, session is read-only"
            );
        }
        countdown
    }

    /// Claim the final submission attempt.
    ///
    /// Returns `None` unless a countdown reading on this session saw its
    /// deadline pass at most [`FINAL_ATTEMPT_WINDOW_SECS`] ago and nobody
    /// claimed the attempt yet.
    pub fn take_final_attempt(&mut self) -> Option<FinalAttempt> {
        let observed = self.expiry_observed_at.take()?;
        let age = self.clock.local_now() - observed;
        if age > Duration::seconds(FINAL_ATTEMPT_WINDOW_SECS) {
            tracing::info!(
                test = %self.kind,
                age_ms = age.num_milliseconds(),
                "final attempt lapsed"
            );
            return None;
        }
        Some(FinalAttempt { _private: () })
    }

    /// Whether answer edits are currently rejected.
    pub fn is_read_only(&mut self) -> bool {
        self.countdown();
        self.state.is_terminal()
    }

    /// Finish-time completeness check. For 16PF a failure switches on
    /// highlighting of unanswered questions.
    pub fn check_finish(&mut self) -> Result<(), Vec<u32>> {
        self.tracker.check_finish(&self.store)
    }

    /// Apply one candidate event.
    pub fn apply(&mut self, event: SessionEvent) -> Result<EventOutcome, SessionError> {
        tracing::debug!(?event, position = self.position, "session event");
        match event {
            SessionEvent::Choose { question, choice } => {
                self.ensure_writable()?;
                self.expect_kind(question, TestKind::Pf16)?;
                let outcome = self.store.set(question, Answer::Choice(choice))?;
                Ok(Self::answer_outcome(question, outcome))
            }
            SessionEvent::Rank {
                question,
                letter,
                rank,
            } => self.edit_ranking(question, RankEdit::Assign { letter, rank }),
            SessionEvent::Unrank { question, letter } => {
                self.edit_ranking(question, RankEdit::Clear { letter })
            }
            SessionEvent::Next => {
                self.tracker.can_advance(&self.store, self.position)?;
                if self.position + 1 < self.questions.len() {
                    self.position += 1;
                }
                Ok(EventOutcome::Moved(self.position))
            }
            SessionEvent::Previous => {
                self.position = self.position.saturating_sub(1);
                Ok(EventOutcome::Moved(self.position))
            }
            SessionEvent::GoTo(index) => self.go_to(index),
            SessionEvent::GoToPage(page) => {
                let paging = self.tracker.paging();
                if page >= paging.page_count() {
                    return Err(SessionError::PositionOutOfRange {
                        index: page,
                        len: paging.page_count(),
                    });
                }
                let first = *paging.questions_on_page(page).start();
                self.go_to(first as usize - 1)
            }
        }
    }

    fn edit_ranking(
        &mut self,
        question: u32,
        edit: RankEdit,
    ) -> Result<EventOutcome, SessionError> {
        self.ensure_writable()?;
        self.expect_kind(question, TestKind::Cmt)?;

        let current = self.ranking_of(question).cloned().unwrap_or_default();
        let reduced = reduce_ranking(current, edit)?;
        match reduced.answer {
            Some(answer) => {
                let outcome = self.store.set(question, answer)?;
                self.drafts.remove(&question);
                Ok(Self::answer_outcome(question, outcome))
            }
            None => {
                self.store.delete(question)?;
                self.drafts.insert(question, reduced.ranking);
                Ok(EventOutcome::Unanswered(question))
            }
        }
    }

    fn go_to(&mut self, index: usize) -> Result<EventOutcome, SessionError> {
        if index >= self.questions.len() {
            return Err(SessionError::PositionOutOfRange {
                index,
                len: self.questions.len(),
            });
        }
        // Moving forward past an incomplete CMT group is the same as "next".
        for p in self.position..index {
            self.tracker.can_advance(&self.store, p)?;
        }
        self.position = index;
        Ok(EventOutcome::Moved(self.position))
    }

    fn ensure_writable(&mut self) -> Result<(), SessionError> {
        if self.is_read_only() {
            return Err(SessionError::ReadOnly(self.state));
        }
        Ok(())
    }

    fn expect_kind(&self, question: u32, kind: TestKind) -> Result<(), SessionError> {
        if self.question(question).is_none() {
            return Err(SessionError::UnknownQuestion(question));
        }
        if self.kind != kind {
            return Err(SessionError::AnswerKindMismatch {
                question,
                expected: self.kind,
            });
        }
        Ok(())
    }

    fn answer_outcome(question: u32, outcome: StoreOutcome) -> EventOutcome {
        match outcome {
            StoreOutcome::Stored => EventOutcome::Answered(question),
            StoreOutcome::Reverted => EventOutcome::Unanswered(question),
        }
    }

    /// Consume the final submission attempt armed by observed expiry.

    /// Terminal transition after the server acknowledged the answers.
    pub(crate) fn mark_submitted(&mut self) {
        if let Err(e) = self.store.discard_mirror() {
            tracing::error!(key = %self.store.key(), "submitted but mirror not cleared: {e}");
        }
        self.state = SessionState::Completed;
        self.clock.close(SessionState::Completed);
        self.expiry_observed_at = None;
        self.drafts.clear();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("position", &self.position)
            .field("store", &self.store)
            .field("clock", &self.clock)
            .finish()
    }
}
