//! REST backend for the assessment API.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use psytest_core::error::EndpointError;
use psytest_core::model::{AnswerEntry, AssignmentRecord, DeadlineDescriptor, Question, TestKind};
use psytest_core::traits::{
    QuestionSource, ServerAck, SessionBundle, SubmissionEndpoint, SubmissionPayload,
};

use crate::config::ApiConfig;
use crate::error::{from_status, from_transport};

/// Talks to `GET /api/tests/{kind}/{token}` and
/// `POST /api/tests/{kind}/{token}/answers`.
pub struct HttpBackend {
    base_url: reqwest::Url,
    api_key: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        let base_url = reqwest::Url::parse(&config.base_url)
            .with_context(|| format!("invalid API base_url {:?}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base_url {:?} cannot carry a path", config.base_url);
        }

        Ok(Self {
            base_url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    /// `{base}/api/tests/{kind}/{token}` plus `tail`. The token always
    /// stays one percent-encoded segment.
    fn session_url(
        &self,
        kind: TestKind,
        token: &str,
        tail: &[&str],
    ) -> Result<reqwest::Url, EndpointError> {
        let kind = kind.to_string();
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                EndpointError::NetworkError(format!("{} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(["api", "tests", kind.as_str(), token])
            .extend(tail);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("Authorization", format!("Bearer {key}")),
            None => req,
        }
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        token: &str,
    ) -> Result<reqwest::Response, EndpointError> {
        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| from_transport(&e, self.timeout_secs))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(from_status(status, token, body));
        }
        Ok(response)
    }
}

#[derive(Deserialize)]
struct SessionResponse {
    questions: Vec<Question>,
    #[serde(default)]
    assignment: AssignmentRecord,
}

#[derive(Serialize)]
struct AnswersRequest<'a> {
    attempt_id: Uuid,
    answers: &'a [AnswerEntry],
}

#[async_trait]
impl QuestionSource for HttpBackend {
    #[instrument(skip(self, token), fields(test = %kind))]
    async fn fetch(&self, kind: TestKind, token: &str) -> Result<SessionBundle, EndpointError> {
        let req = self.client.get(self.session_url(kind, token, &[])?);
        let response = self.send(req, token).await?;

        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| EndpointError::InvalidResponse(format!("failed to parse session: {e}")))?;

        tracing::debug!(questions = body.questions.len(), "session fetched");
        Ok(SessionBundle {
            questions: body.questions,
            deadline: DeadlineDescriptor::from_record(&body.assignment),
        })
    }
}

#[async_trait]
impl SubmissionEndpoint for HttpBackend {
    #[instrument(skip(self, payload), fields(test = %payload.test, attempt = %payload.attempt_id))]
    async fn submit(&self, payload: &SubmissionPayload) -> Result<ServerAck, EndpointError> {
        let body = AnswersRequest {
            attempt_id: payload.attempt_id,
            answers: &payload.answers,
        };
        let url = self.session_url(payload.test, &payload.token, &["answers"])?;
        let req = self.client.post(url).json(&body);
        let response = self.send(req, &payload.token).await?;

        let ack: ServerAck = response
            .json()
            .await
            .map_err(|e| EndpointError::InvalidResponse(format!("failed to parse ack: {e}")))?;

        if ack.status.eq_ignore_ascii_case("error") {
            return Err(EndpointError::ApiError {
                status: 200,
                message: ack.message.unwrap_or_default(),
            });
        }
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psytest_core::model::{Answer, Choice, SessionState};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer, api_key: Option<&str>) -> HttpBackend {
        HttpBackend::new(&ApiConfig {
            base_url: server.uri(),
            api_key: api_key.map(String::from),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn pf16_questions() -> serde_json::Value {
        serde_json::Value::Array(
            (1..=185)
                .map(|n| serde_json::json!({"number": n, "prompt": format!("Statement {n}")}))
                .collect(),
        )
    }

    fn payload(token: &str) -> SubmissionPayload {
        SubmissionPayload {
            attempt_id: Uuid::new_v4(),
            test: TestKind::Pf16,
            token: token.into(),
            answers: vec![AnswerEntry {
                question: 1,
                answer: Answer::Choice(Choice::B),
            }],
        }
    }

    #[tokio::test]
    async fn fetch_parses_questions_and_assignment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tests/16pf/tok-1"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "questions": pf16_questions(),
                "assignment": {
                    "server_now": "2024-05-20T09:00:00Z",
                    "deadline": "2024-05-20T09:45:00Z",
                    "max_minutes": 45,
                    "state": "STARTED"
                }
            })))
            .mount(&server)
            .await;

        let bundle = backend(&server, Some("test-key"))
            .fetch(TestKind::Pf16, "tok-1")
            .await
            .unwrap();
        assert_eq!(bundle.questions.len(), 185);
        assert_eq!(bundle.deadline.state, SessionState::Started);
        assert_eq!(bundle.deadline.max_minutes, Some(45));
        assert!(bundle.deadline.deadline.is_some());
    }

    #[tokio::test]
    async fn fetch_tolerates_missing_assignment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tests/16pf/tok-2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "questions": pf16_questions() })),
            )
            .mount(&server)
            .await;

        let bundle = backend(&server, None)
            .fetch(TestKind::Pf16, "tok-2")
            .await
            .unwrap();
        assert_eq!(bundle.deadline.state, SessionState::Pending);
        assert!(bundle.deadline.deadline.is_none());
    }

    #[tokio::test]
    async fn fetch_unknown_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tests/cmt/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = backend(&server, None)
            .fetch(TestKind::Cmt, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, EndpointError::UnknownToken(ref t) if t == "missing"));
    }

    #[tokio::test]
    async fn token_stays_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tests/cmt/a%2Fb%3Fc%23d"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/tests/16pf/a%2Fb%3Fc%23d/answers"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server, None);
        let err = backend.fetch(TestKind::Cmt, "a/b?c#d").await.unwrap_err();
        assert!(matches!(err, EndpointError::UnknownToken(_)));
        backend.submit(&payload("a/b?c#d")).await.unwrap();
    }

    #[tokio::test]
    async fn base_url_path_prefix_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assess/api/tests/16pf/tok/answers"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&ApiConfig {
            base_url: format!("{}/assess/", server.uri()),
            api_key: None,
            timeout_secs: 5,
        })
        .unwrap();
        backend.submit(&payload("tok")).await.unwrap();
    }

    #[test]
    fn rejects_unusable_base_url() {
        for base_url in ["not a url", "mailto:staff@example.com"] {
            let result = HttpBackend::new(&ApiConfig {
                base_url: base_url.into(),
                api_key: None,
                timeout_secs: 5,
            });
            assert!(result.is_err(), "{base_url}");
        }
    }

    #[tokio::test]
    async fn fetch_garbage_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tests/cmt/tok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = backend(&server, None)
            .fetch(TestKind::Cmt, "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, EndpointError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn submit_posts_answers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tests/16pf/tok/answers"))
            .and(body_partial_json(serde_json::json!({
                "answers": [{"question": 1, "answer": {"choice": "b"}}]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ack = backend(&server, None).submit(&payload("tok")).await.unwrap();
        assert_eq!(ack.status, "ok");
        assert!(ack.message.is_none());
    }

    #[tokio::test]
    async fn submit_on_closed_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tests/16pf/tok/answers"))
            .respond_with(ResponseTemplate::new(409).set_body_string("already completed"))
            .mount(&server)
            .await;

        let err = backend(&server, None)
            .submit(&payload("tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, EndpointError::SessionClosed(_)));
    }

    #[tokio::test]
    async fn submit_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tests/16pf/tok/answers"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let err = backend(&server, None)
            .submit(&payload("tok"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn submit_error_status_in_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tests/16pf/tok/answers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"status": "error", "message": "answers rejected"}),
            ))
            .mount(&server)
            .await;

        let err = backend(&server, None)
            .submit(&payload("tok"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("answers rejected"));
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let backend = HttpBackend::new(&ApiConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: None,
            timeout_secs: 2,
        })
        .unwrap();
        let err = backend.submit(&payload("tok")).await.unwrap_err();
        assert!(matches!(
            err,
            EndpointError::NetworkError(_) | EndpointError::Timeout(_)
        ));
        assert!(err.is_retryable());
    }
}
