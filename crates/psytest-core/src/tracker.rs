//! Completeness tracking, paging and navigation gating.
//!
//! CMT gates "next" on the current group being fully ranked; 16PF lets the
//! candidate move freely and only checks completeness when finishing.

use std::ops::RangeInclusive;

use crate::error::SessionError;
use crate::model::{Answer, TestKind};
use crate::ranking::is_valid_ranking;
use crate::store::AnswerStore;

/// Completion status of one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionStatus {
    Answered,
    Unanswered,
}

/// Fixed-size pages over a questionnaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page_size: usize,
    pub total: usize,
}

impl Paging {
    pub fn for_kind(kind: TestKind) -> Self {
        Self {
            page_size: kind.page_size(),
            total: kind.question_count(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.total.div_ceil(self.page_size)
    }

    /// 0-based page holding question `number`.
    pub fn page_of(&self, number: u32) -> usize {
        (number.saturating_sub(1) as usize) / self.page_size
    }

    /// Question numbers on 0-based page `page`.
    pub fn questions_on_page(&self, page: usize) -> RangeInclusive<u32> {
        let first = page * self.page_size + 1;
        let last = ((page + 1) * self.page_size).min(self.total);
        first as u32..=last as u32
    }
}

/// Aggregates per-question completion for a session.
#[derive(Debug, Clone)]
pub struct CompletenessTracker {
    kind: TestKind,
    paging: Paging,
    highlight_missing: bool,
}

impl CompletenessTracker {
    pub fn new(kind: TestKind) -> Self {
        Self {
            kind,
            paging: Paging::for_kind(kind),
            highlight_missing: false,
        }
    }

    pub fn paging(&self) -> Paging {
        self.paging
    }

    pub fn answered_count(&self, store: &AnswerStore) -> usize {
        store.len()
    }

    pub fn is_complete(&self, store: &AnswerStore) -> bool {
        self.answered_count(store) == self.kind.question_count()
    }

    pub fn status_of(&self, store: &AnswerStore, number: u32) -> QuestionStatus {
        if self.is_question_complete(store, number) {
            QuestionStatus::Answered
        } else {
            QuestionStatus::Unanswered
        }
    }

    /// Whether `number` is rendered on the same page as the question at
    /// 0-based `position`.
    pub fn is_current_page(&self, number: u32, position: usize) -> bool {
        self.paging.page_of(number) == self.paging.page_of(position as u32 + 1)
    }

    /// Unanswered question numbers, ascending.
    pub fn missing(&self, store: &AnswerStore) -> Vec<u32> {
        (1..=self.kind.question_count() as u32)
            .filter(|&n| !self.is_question_complete(store, n))
            .collect()
    }

    /// Whether the candidate may leave the question at `position` forward.
    pub fn can_advance(&self, store: &AnswerStore, position: usize) -> Result<(), SessionError> {
        let number = position as u32 + 1;
        if self.kind.gates_navigation() && !self.is_question_complete(store, number) {
            return Err(SessionError::QuestionIncomplete(number));
        }
        Ok(())
    }

    /// Finish-time validation. Returns the missing question numbers on
    /// failure; for 16PF a failure also turns on error highlighting.
    pub fn check_finish(&mut self, store: &AnswerStore) -> Result<(), Vec<u32>> {
        let missing = self.missing(store);
        if missing.is_empty() {
            self.highlight_missing = false;
            return Ok(());
        }
        if self.kind == TestKind::Pf16 {
            self.highlight_missing = true;
        }
        Err(missing)
    }

    /// Whether the UI is flagging unanswered questions after a failed finish.
    pub fn highlighting(&self) -> bool {
        self.highlight_missing
    }

    /// Whether `number` should be rendered as an error.
    pub fn is_highlighted(&self, store: &AnswerStore, number: u32) -> bool {
        self.highlight_missing && !self.is_question_complete(store, number)
    }

    fn is_question_complete(&self, store: &AnswerStore, number: u32) -> bool {
        match store.get(number) {
            Some(Answer::Ranking(ranking)) => is_valid_ranking(ranking),
            Some(Answer::Choice(_)) => true,
            None => false,
        }
    }
}
