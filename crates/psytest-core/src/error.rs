//! Error types for the session engine.
//!
//! Endpoint errors are defined here rather than in `psytest-client` so the
//! submission gate can classify failures without string matching.

use thiserror::Error;

use crate::model::{SessionState, TestKind};

/// Errors that can occur when talking to the external question source or
/// submission endpoint.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The server does not know this access token.
    #[error("unknown access token: {0}")]
    UnknownToken(String),

    /// The server refused the request because the session is closed on its
    /// side (already submitted or expired).
    #[error("session closed by server: {0}")]
    SessionClosed(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The response body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl EndpointError {
    /// Returns `true` if repeating the same request may succeed.
    ///
    /// The gate never discards local answers on any endpoint failure; this
    /// only tells the caller whether offering a retry makes sense.
    pub fn is_retryable(&self) -> bool {
        match self {
            EndpointError::Timeout(_) | EndpointError::NetworkError(_) => true,
            EndpointError::ApiError { status, .. } => *status >= 500 || *status == 429,
            EndpointError::InvalidResponse(_) => true,
            EndpointError::UnknownToken(_) | EndpointError::SessionClosed(_) => false,
        }
    }
}

/// Errors raised by a persistent mirror backend or the mirror codec.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The stored document could not be parsed.
    #[error("corrupt local mirror: {0}")]
    Corrupt(String),

    /// The stored document uses a format version this build does not read.
    #[error("unsupported mirror version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// The stored document belongs to a different test type.
    #[error("mirror holds {found} answers, expected {expected}")]
    KindMismatch { expected: TestKind, found: TestKind },

    /// The backend failed to read or write.
    #[error("mirror backend error: {0}")]
    Backend(String),
}

/// Errors raised while applying candidate input to a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session no longer accepts answer edits.
    #[error("session is read-only ({0})")]
    ReadOnly(SessionState),

    /// CMT navigation is blocked until the current group is fully ranked.
    #[error("question {0} must be fully ranked before moving on")]
    QuestionIncomplete(u32),

    #[error("question {0} does not exist in this test")]
    UnknownQuestion(u32),

    /// The answer shape does not fit the test type.
    #[error("question {question} expects a {expected} answer")]
    AnswerKindMismatch { question: u32, expected: TestKind },

    #[error("position {index} is out of range (0..{len})")]
    PositionOutOfRange { index: usize, len: usize },

    /// A rank outside 1..=5 was requested.
    #[error("rank {0} is outside 1..=5")]
    InvalidRank(u8),
}

/// Errors raised while building a session from the question source.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch session: {0}")]
    Source(#[from] EndpointError),

    #[error("{kind} expects {expected} questions, server sent {found}")]
    QuestionCount {
        kind: TestKind,
        expected: usize,
        found: usize,
    },

    /// Question numbers are not the contiguous sequence 1..=N.
    #[error("question numbering broken: expected {expected}, found {found}")]
    Numbering { expected: u32, found: u32 },

    #[error("question {question} has {found} options, expected {expected}")]
    OptionCount {
        question: u32,
        expected: usize,
        found: usize,
    },
}

/// Errors returned by the submission gate.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The time limit has passed. Fixed candidate-facing message.
    #[error("the time allotted for this test has expired")]
    SessionExpired,

    /// The session was already accepted by the server.
    #[error("answers for this session were already submitted")]
    AlreadySubmitted,

    /// Some questions are unanswered or inconsistently ranked.
    #[error("incomplete answers, missing questions: {}", join_numbers(.0))]
    IncompleteAnswers(Vec<u32>),

    /// The endpoint call failed. Local answers are untouched.
    #[error("submission failed: {0}")]
    Network(#[source] EndpointError),
}

impl SubmissionError {
    /// Returns `true` if the candidate can try again without staff action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SubmissionError::Network(_) | SubmissionError::IncompleteAnswers(_)
        )
    }
}

fn join_numbers(numbers: &[u32]) -> String {
    numbers
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
