//! Mock backend for testing sessions without a server.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use psytest_core::error::EndpointError;
use psytest_core::model::{DeadlineDescriptor, Question, QuestionOption, TestKind};
use psytest_core::traits::{
    QuestionSource, ServerAck, SessionBundle, SubmissionEndpoint, SubmissionPayload,
};

/// Serves a fixed bundle and records every submission.
pub struct MockBackend {
    questions: Vec<Question>,
    deadline: Mutex<DeadlineDescriptor>,
    /// Number of upcoming submissions to fail with a network error.
    failures_left: AtomicU32,
    fetch_count: AtomicU32,
    submit_count: AtomicU32,
    payloads: Mutex<Vec<SubmissionPayload>>,
}

impl MockBackend {
    /// Serve `questions` with the given time budget.
    pub fn new(questions: Vec<Question>, deadline: DeadlineDescriptor) -> Self {
        Self {
            questions,
            deadline: Mutex::new(deadline),
            failures_left: AtomicU32::new(0),
            fetch_count: AtomicU32::new(0),
            submit_count: AtomicU32::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    /// Serve a full questionnaire of placeholder questions for `kind`.
    pub fn for_kind(kind: TestKind, deadline: DeadlineDescriptor) -> Self {
        Self::new(placeholder_questions(kind), deadline)
    }

    /// Change the descriptor returned by later fetches, e.g. to simulate
    /// the server closing the session.
    pub fn set_deadline(&self, deadline: DeadlineDescriptor) {
        *self.deadline.lock().unwrap_or_else(|e| e.into_inner()) = deadline;
    }

    /// Fail the next `n` submissions with a network error.
    pub fn fail_next_submissions(&self, n: u32) {
        self.failures_left.store(n, Ordering::Relaxed);
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// Submissions received, failed ones included.
    pub fn submit_count(&self) -> u32 {
        self.submit_count.load(Ordering::Relaxed)
    }

    pub fn last_payload(&self) -> Option<SubmissionPayload> {
        self.payloads().last().cloned()
    }

    pub fn payloads(&self) -> Vec<SubmissionPayload> {
        self.payloads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Contiguously numbered questions with the option codes of `kind`.
pub fn placeholder_questions(kind: TestKind) -> Vec<Question> {
    let codes = ["a", "b", "c", "d", "e"];
    (1..=kind.question_count() as u32)
        .map(|number| Question {
            number,
            prompt: format!("{kind} question {number}"),
            options: codes[..kind.option_count()]
                .iter()
                .map(|code| QuestionOption {
                    code: code.to_string(),
                    label: format!("Option {}", code.to_uppercase()),
                })
                .collect(),
        })
        .collect()
}

#[async_trait]
impl QuestionSource for MockBackend {
    async fn fetch(&self, kind: TestKind, token: &str) -> Result<SessionBundle, EndpointError> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        if token.is_empty() {
            return Err(EndpointError::UnknownToken(String::new()));
        }
        tracing::debug!(test = %kind, token, "mock fetch");
        Ok(SessionBundle {
            questions: self.questions.clone(),
            deadline: self
                .deadline
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        })
    }
}

#[async_trait]
impl SubmissionEndpoint for MockBackend {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<ServerAck, EndpointError> {
        self.submit_count.fetch_add(1, Ordering::Relaxed);
        self.payloads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload.clone());

        let failing = self
            .failures_left
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EndpointError::NetworkError("connection reset by peer".into()));
        }

        Ok(ServerAck {
            status: "ok".into(),
            message: Some(format!("{} answers received", payload.answers.len())),
            received_at: Some(Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psytest_core::model::SessionState;
    use uuid::Uuid;

    fn open_deadline() -> DeadlineDescriptor {
        DeadlineDescriptor {
            server_now: None,
            deadline: None,
            max_minutes: None,
            state: SessionState::Pending,
        }
    }

    fn payload() -> SubmissionPayload {
        SubmissionPayload {
            attempt_id: Uuid::new_v4(),
            test: TestKind::Cmt,
            token: "tok".into(),
            answers: vec![],
        }
    }

    #[test]
    fn placeholder_questionnaires_have_kind_shape() {
        let cmt = placeholder_questions(TestKind::Cmt);
        assert_eq!(cmt.len(), 15);
        assert_eq!(cmt[0].options.len(), 5);

        let pf16 = placeholder_questions(TestKind::Pf16);
        assert_eq!(pf16.len(), 185);
        assert_eq!(pf16[184].number, 185);
        assert_eq!(pf16[0].options.len(), 3);
    }

    #[tokio::test]
    async fn fetch_counts_calls() {
        let backend = MockBackend::for_kind(TestKind::Cmt, open_deadline());
        let bundle = backend.fetch(TestKind::Cmt, "tok").await.unwrap();
        assert_eq!(bundle.questions.len(), 15);
        backend.fetch(TestKind::Cmt, "tok").await.unwrap();
        assert_eq!(backend.fetch_count(), 2);
    }

    #[tokio::test]
    async fn fails_requested_number_of_submissions() {
        let backend = MockBackend::for_kind(TestKind::Cmt, open_deadline());
        backend.fail_next_submissions(2);

        assert!(backend.submit(&payload()).await.is_err());
        assert!(backend.submit(&payload()).await.is_err());
        let ack = backend.submit(&payload()).await.unwrap();
        assert_eq!(ack.status, "ok");
        assert_eq!(backend.submit_count(), 3);
        assert_eq!(backend.payloads().len(), 3);
        assert!(backend.last_payload().is_some());
    }
}
