//! Core data model types for psytest.
//!
//! Questions, answers and the deadline descriptor, as fetched from the
//! external question source and kept for the lifetime of a session.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::ranking::Ranking;

/// The two timed questionnaires the engine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestKind {
    /// Cuestionario de Motivación para el Trabajo: 15 forced-ranking groups.
    #[serde(rename = "cmt")]
    Cmt,
    /// Sixteen Personality Factor inventory: 185 single-select items.
    #[serde(rename = "16pf")]
    Pf16,
}

impl TestKind {
    /// Fixed number of questions in the questionnaire.
    pub fn question_count(self) -> usize {
        match self {
            TestKind::Cmt => 15,
            TestKind::Pf16 => 185,
        }
    }

    /// Options shown per question.
    pub fn option_count(self) -> usize {
        match self {
            TestKind::Cmt => 5,
            TestKind::Pf16 => 3,
        }
    }

    /// Questions rendered per navigation page.
    pub fn page_size(self) -> usize {
        match self {
            TestKind::Cmt => 1,
            TestKind::Pf16 => 10,
        }
    }

    /// Whether "next" is gated on the current question being complete.
    pub fn gates_navigation(self) -> bool {
        matches!(self, TestKind::Cmt)
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestKind::Cmt => write!(f, "cmt"),
            TestKind::Pf16 => write!(f, "16pf"),
        }
    }
}

impl FromStr for TestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cmt" => Ok(TestKind::Cmt),
            "16pf" | "pf16" | "16-pf" => Ok(TestKind::Pf16),
            other => Err(format!("unknown test type: {other}")),
        }
    }
}

/// A selectable 16PF option code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    A,
    B,
    C,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::A => write!(f, "a"),
            Choice::B => write!(f, "b"),
            Choice::C => write!(f, "c"),
        }
    }
}

impl FromStr for Choice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a" => Ok(Choice::A),
            "b" => Ok(Choice::B),
            "c" => Ok(Choice::C),
            other => Err(format!("unknown option: {other}")),
        }
    }
}

/// One option of a question as rendered to the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    /// Option code (`a`..`c` for 16PF, `a`..`e` for CMT).
    pub code: String,
    pub label: String,
}

/// A question fetched from the question source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// 1-based position, contiguous across the questionnaire.
    pub number: u32,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

/// A valid answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    Choice(Choice),
    Ranking(Ranking),
}

impl Answer {
    /// Whether this answer shape belongs to `kind`.
    pub fn fits(&self, kind: TestKind) -> bool {
        matches!(
            (self, kind),
            (Answer::Choice(_), TestKind::Pf16) | (Answer::Ranking(_), TestKind::Cmt)
        )
    }

    /// Type-specific validity predicate.
    pub fn is_valid(&self) -> bool {
        match self {
            Answer::Choice(_) => true,
            Answer::Ranking(ranking) => ranking.is_complete(),
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Choice(choice) => write!(f, "{choice}"),
            Answer::Ranking(ranking) => write!(f, "{ranking}"),
        }
    }
}

/// A question number paired with its answer, as listed in mirrors and
/// submission payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question: u32,
    pub answer: Answer,
}

/// Lifecycle state of a test assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "started")]
    Started,
    #[serde(alias = "completed")]
    Completed,
    #[serde(alias = "expired")]
    Expired,
}

impl SessionState {
    /// Terminal states reject every further answer edit.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Expired)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Pending => write!(f, "PENDING"),
            SessionState::Started => write!(f, "STARTED"),
            SessionState::Completed => write!(f, "COMPLETED"),
            SessionState::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Raw assignment record as reported by the server.
///
/// Timestamps are kept as strings so a malformed value degrades the
/// countdown instead of failing the whole load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentRecord {
    #[serde(default)]
    pub server_now: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub max_minutes: Option<u32>,
    pub state: Option<SessionState>,
}

/// Server-issued time budget for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineDescriptor {
    pub server_now: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub max_minutes: Option<u32>,
    pub state: SessionState,
}

impl DeadlineDescriptor {
    /// Derive the descriptor from an assignment record.
    ///
    /// Unparseable timestamps become `None`; a missing state is read as
    /// `PENDING`.
    pub fn from_record(record: &AssignmentRecord) -> Self {
        let server_now = record.server_now.as_deref().and_then(parse_timestamp);
        let deadline = record.deadline.as_deref().and_then(parse_timestamp);

        if record.deadline.is_some() && deadline.is_none() {
            tracing::warn!(
                raw = record.deadline.as_deref().unwrap_or_default(),
                "unparseable deadline, local limit disabled"
            );
        }

        Self {
            server_now,
            deadline,
            max_minutes: record.max_minutes,
            state: record.state.unwrap_or(SessionState::Pending),
        }
    }
}

/// Parse an RFC 3339 timestamp, or a naive `YYYY-MM-DD HH:MM:SS` read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Sort questions by number and check they form a valid questionnaire for
/// `kind`.
pub fn normalize_questions(
    kind: TestKind,
    mut questions: Vec<Question>,
) -> Result<Vec<Question>, LoadError> {
    let expected = kind.question_count();
    if questions.len() != expected {
        return Err(LoadError::QuestionCount {
            kind,
            expected,
            found: questions.len(),
        });
    }

    questions.sort_by_key(|q| q.number);

    for (idx, question) in questions.iter().enumerate() {
        let expected_number = idx as u32 + 1;
        if question.number != expected_number {
            return Err(LoadError::Numbering {
                expected: expected_number,
                found: question.number,
            });
        }
        // An empty option list means the client renders the fixed codes.
        if !question.options.is_empty() && question.options.len() != kind.option_count() {
            return Err(LoadError::OptionCount {
                question: question.number,
                expected: kind.option_count(),
                found: question.options.len(),
            });
        }
    }

    Ok(questions)
}
