//! The `psytest take` command: interactive terminal driver.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

use psytest_core::gate::SubmissionGate;
use psytest_core::model::{SessionState, TestKind};
use psytest_core::session::{EventOutcome, Session};

use super::input::{self, Command, HELP};
use super::{render, submit, SessionContext};

/// Remaining-time warnings, in milliseconds.
const WARN_AT_MS: [u64; 2] = [5 * 60_000, 60_000];

pub async fn execute(kind: TestKind, token: String, config_path: Option<PathBuf>) -> Result<()> {
    let ctx = SessionContext::open(config_path.as_deref())?;
    let mut session = ctx.load_session(kind, &token).await?;
    let gate = SubmissionGate::new(ctx.backend.clone());

    match session.state() {
        SessionState::Completed => {
            println!("This {kind} session has already been submitted.");
            return Ok(());
        }
        SessionState::Expired => {
            println!(
                "Time is up for this {kind} session. Answers were not submitted; \
                 staff must re-enable the session."
            );
            return Ok(());
        }
        SessionState::Pending | SessionState::Started => {}
    }

    if session.answered_count() > 0 {
        println!(
            "Restored {} saved answers, continuing at question {}.",
            session.answered_count(),
            session.position() + 1
        );
    }
    println!("Type 'help' for commands.");
    show(&mut session);
    prompt();

    let mut ticker = tokio::time::interval(Duration::from_millis(ctx.config.tick_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut warned = BTreeSet::new();

    loop {
        let before = session.state();

        tokio::select! {
            _ = ticker.tick() => {
                let countdown = session.countdown();
                if let Some(ms) = countdown.remaining_ms() {
                    for threshold in WARN_AT_MS {
                        if ms > 0 && ms <= threshold && warned.insert(threshold) {
                            println!("\n{countdown} left.");
                            prompt();
                        }
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    println!("\nAnswers are saved locally.");
                    return Ok(());
                };
                let current = session.current_question().number;
                match input::parse(kind, current, &line) {
                    Err(msg) => println!("{msg}"),
                    Ok(Command::Quit) => {
                        println!("Answers are saved locally.");
                        return Ok(());
                    }
                    Ok(Command::Submit) => {
                        let result = submit::submit(&gate, &mut session).await;
                        match result {
                            Ok(()) => return Ok(()),
                            // Expired during the check; the final attempt follows below.
                            Err(_) if session.state() != before => {}
                            Err(e) => {
                                println!("{e:#}");
                                if session.kind() == TestKind::Pf16 {
                                    println!("{}", render::overview(&session));
                                }
                            }
                        }
                    }
                    Ok(Command::Help) => println!("{HELP}"),
                    Ok(Command::Show) => show(&mut session),
                    Ok(Command::Overview) => println!("{}", render::overview(&session)),
                    Ok(Command::Events(events)) => apply_all(&mut session, events),
                }
                if session.state() == before {
                    prompt();
                }
            }
        }

        if before == SessionState::Started && session.state() == SessionState::Expired {
            println!("\nTime is up. Submitting your answers.");
            return match session.take_final_attempt() {
                Some(attempt) => submit::submit_final(&gate, &mut session, attempt).await,
                None => submit::submit(&gate, &mut session).await,
            };
        }
    }
}

fn apply_all(session: &mut Session, events: Vec<psytest_core::session::SessionEvent>) {
    let position = session.position();
    for event in events {
        match session.apply(event) {
            Ok(EventOutcome::Answered(n)) => tracing::debug!(question = n, "answered"),
            Ok(EventOutcome::Unanswered(n)) => tracing::debug!(question = n, "unanswered"),
            Ok(EventOutcome::Moved(_)) => {}
            Err(e) => {
                println!("{e}");
                break;
            }
        }
    }
    if session.position() != position || session.kind() == TestKind::Cmt {
        show(session);
    } else {
        println!("{}", render::header(session));
    }
}

fn show(session: &mut Session) {
    println!("{}", render::header(session));
    println!("{}", render::question(session));
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
