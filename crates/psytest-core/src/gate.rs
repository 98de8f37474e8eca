//! Submission gate: the only path from a session to the submission endpoint.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::SubmissionError;
use crate::model::SessionState;
use crate::session::{FinalAttempt, Session};
use crate::traits::{ServerAck, SubmissionEndpoint, SubmissionPayload};

/// Validates a session and hands its answers to the submission endpoint.
pub struct SubmissionGate {
    endpoint: Arc<dyn SubmissionEndpoint>,
}

impl SubmissionGate {
    pub fn new(endpoint: Arc<dyn SubmissionEndpoint>) -> Self {
        Self { endpoint }
    }

    /// Submit the session's answers.
    ///
    /// Checks, in order: the session is not expired, every question is
    /// complete, then calls the endpoint. Only a positive acknowledgement
    /// clears the local mirror and completes the session; any endpoint
    /// failure leaves state and mirror untouched.
    pub async fn submit(&self, session: &mut Session) -> Result<ServerAck, SubmissionError> {
        session.countdown();
        match session.state() {
            SessionState::Completed => Err(SubmissionError::AlreadySubmitted),
            SessionState::Expired => {
                tracing::info!(test = %session.kind(), "submission refused, session expired");
                Err(SubmissionError::SessionExpired)
            }
            SessionState::Pending | SessionState::Started => self.deliver(session).await,
        }
    }

    /// Submit an expired session once, using the attempt it handed out when
    /// it saw its deadline pass. The completeness check still applies and
    /// the attempt is spent whatever the outcome.
    pub async fn submit_final(
        &self,
        session: &mut Session,
        _attempt: FinalAttempt,
    ) -> Result<ServerAck, SubmissionError> {
        match session.state() {
            SessionState::Completed => Err(SubmissionError::AlreadySubmitted),
            _ => {
                tracing::info!(test = %session.kind(), "final submission after expiry");
                self.deliver(session).await
            }
        }
    }

    async fn deliver(&self, session: &mut Session) -> Result<ServerAck, SubmissionError> {
        if let Err(missing) = session.check_finish() {
            tracing::info!(
                test = %session.kind(),
                missing = missing.len(),
                "submission blocked, answers incomplete"
            );
            return Err(SubmissionError::IncompleteAnswers(missing));
        }

        let payload = SubmissionPayload {
            attempt_id: Uuid::new_v4(),
            test: session.kind(),
            token: session.token().to_string(),
            answers: session.store().to_ordered_list(),
        };

        match self.endpoint.submit(&payload).await {
            Ok(ack) => {
                session.mark_submitted();
                tracing::info!(
                    test = %payload.test,
                    attempt = %payload.attempt_id,
                    answers = payload.answers.len(),
                    "submission accepted"
                );
                Ok(ack)
            }
            Err(e) => {
                tracing::error!(
                    test = %payload.test,
                    attempt = %payload.attempt_id,
                    retryable = e.is_retryable(),
                    "submission failed: {e}"
                );
                Err(SubmissionError::Network(e))
            }
        }
    }
}
