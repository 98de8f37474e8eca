//! Traits for the external collaborators of a session.
//!
//! Implemented over HTTP by `psytest-client`; tests use in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EndpointError;
use crate::model::{AnswerEntry, DeadlineDescriptor, Question, TestKind};

/// Everything needed to build a session, fetched once per load.
#[derive(Debug, Clone)]
pub struct SessionBundle {
    pub questions: Vec<Question>,
    pub deadline: DeadlineDescriptor,
}

/// Issues the questions and time budget for an access token.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn fetch(&self, kind: TestKind, token: &str) -> Result<SessionBundle, EndpointError>;
}

/// Final answers sent to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionPayload {
    /// Fresh per attempt so the server can deduplicate retries.
    pub attempt_id: Uuid,
    pub test: TestKind,
    pub token: String,
    /// Ascending by question number.
    pub answers: Vec<AnswerEntry>,
}

/// Positive acknowledgement of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAck {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

/// Accepts final answers for an access token.
#[async_trait]
pub trait SubmissionEndpoint: Send + Sync {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<ServerAck, EndpointError>;
}
