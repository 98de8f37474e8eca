//! psytest-core — Timed test-session engine.
//!
//! This crate holds the session model and the rules every client builds
//! on: drift-corrected countdown, mirrored answer store, CMT ranking
//! validation, completeness tracking and the submission gate.

pub mod clock;
pub mod error;
pub mod gate;
pub mod mirror;
pub mod model;
pub mod ranking;
pub mod session;
pub mod store;
pub mod tracker;
pub mod traits;

pub use clock::{Clock, ClockSync, Countdown, ManualClock, SystemClock};
pub use error::{EndpointError, LoadError, MirrorError, SessionError, SubmissionError};
pub use gate::SubmissionGate;
pub use mirror::{MemoryMirror, MirrorKey, MirrorStore};
pub use model::{Answer, AnswerEntry, Choice, Question, SessionState, TestKind};
pub use ranking::{is_valid_ranking, Letter, Ranking};
pub use session::{EventOutcome, FinalAttempt, Session, SessionEvent};
pub use store::AnswerStore;
pub use traits::{QuestionSource, ServerAck, SessionBundle, SubmissionEndpoint};
