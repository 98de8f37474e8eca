//! The `psytest submit` command.

use std::path::PathBuf;

use anyhow::Result;

use psytest_core::error::SubmissionError;
use psytest_core::gate::SubmissionGate;
use psytest_core::model::TestKind;
use psytest_core::session::{FinalAttempt, Session};
use psytest_core::traits::ServerAck;

use super::render::question_list;
use super::SessionContext;

pub async fn execute(kind: TestKind, token: String, config_path: Option<PathBuf>) -> Result<()> {
    let ctx = SessionContext::open(config_path.as_deref())?;
    let mut session = ctx.load_session(kind, &token).await?;
    let gate = SubmissionGate::new(ctx.backend.clone());
    submit(&gate, &mut session).await
}

/// Run the gate and print the outcome.
pub async fn submit(gate: &SubmissionGate, session: &mut Session) -> Result<()> {
    let result = gate.submit(session).await;
    report(session, result)
}

/// Spend the session's final attempt after it expired.
pub async fn submit_final(
    gate: &SubmissionGate,
    session: &mut Session,
    attempt: FinalAttempt,
) -> Result<()> {
    let result = gate.submit_final(session, attempt).await;
    report(session, result)
}

fn report(session: &Session, result: Result<ServerAck, SubmissionError>) -> Result<()> {
    match result {
        Ok(ack) => {
            println!(
                "Submitted {} answers ({}){}",
                session.questions().len(),
                ack.status,
                ack.message.map(|m| format!(": {m}")).unwrap_or_default()
            );
            Ok(())
        }
        Err(SubmissionError::IncompleteAnswers(missing)) => {
            anyhow::bail!(
                "{} questions unanswered: {}",
                missing.len(),
                question_list(&missing, 20)
            )
        }
        Err(e) if e.is_recoverable() => {
            Err(anyhow::Error::new(e).context("answers are kept locally, try again"))
        }
        Err(SubmissionError::SessionExpired) => anyhow::bail!(
            "{}; answers were not submitted and staff must re-enable the session",
            SubmissionError::SessionExpired
        ),
        Err(e) => Err(e.into()),
    }
}
