//! End-to-end session runs against the mock backend and a file mirror.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use psytest_client::MockBackend;
use psytest_core::clock::{Countdown, ManualClock};
use psytest_core::error::{SessionError, SubmissionError};
use psytest_core::gate::SubmissionGate;
use psytest_core::mirror::MirrorStore;
use psytest_core::model::{Choice, DeadlineDescriptor, SessionState, TestKind};
use psytest_core::ranking::Letter;
use psytest_core::session::{Session, SessionEvent};
use psytest_store::FileMirror;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 20, 9, 0, 0).unwrap()
}

fn started(minutes: i64) -> DeadlineDescriptor {
    DeadlineDescriptor {
        server_now: Some(t0()),
        deadline: Some(t0() + Duration::minutes(minutes)),
        max_minutes: Some(minutes as u32),
        state: SessionState::Started,
    }
}

fn rank_fully(session: &mut Session, question: u32) {
    for (letter, rank) in Letter::ALL.into_iter().zip([5u8, 4, 3, 2, 1]) {
        session
            .apply(SessionEvent::Rank {
                question,
                letter,
                rank,
            })
            .unwrap();
    }
}

#[tokio::test]
async fn cmt_reload_restores_fourteen_groups() {
    let dir = TempDir::new().unwrap();
    let mirror: Arc<dyn MirrorStore> = Arc::new(FileMirror::open(dir.path()).unwrap());
    let backend = MockBackend::for_kind(TestKind::Cmt, started(30));
    let clock = Arc::new(ManualClock::new(t0()));

    let mut first = Session::load(TestKind::Cmt, "cand-7", &backend, mirror.clone(), clock.clone())
        .await
        .unwrap();
    for question in 1..=14 {
        rank_fully(&mut first, question);
        first.apply(SessionEvent::Next).unwrap();
    }
    // Partial draft on the last group is never persisted.
    first
        .apply(SessionEvent::Rank {
            question: 15,
            letter: Letter::A,
            rank: 5,
        })
        .unwrap();
    drop(first);

    clock.advance(Duration::minutes(3));
    backend.set_deadline(DeadlineDescriptor {
        server_now: Some(t0() + Duration::minutes(3)),
        ..started(30)
    });
    let mut reloaded =
        Session::load(TestKind::Cmt, "cand-7", &backend, mirror.clone(), clock.clone())
            .await
            .unwrap();

    assert_eq!(backend.fetch_count(), 2);
    assert_eq!(reloaded.answered_count(), 14);
    assert_eq!(reloaded.missing(), vec![15]);
    assert_eq!(reloaded.position(), 14);
    assert!(reloaded.ranking_of(15).is_none());
    assert_eq!(
        reloaded.ranking_of(3).map(|r| r.to_string()).as_deref(),
        Some("a=5,b=4,c=3,d=2,e=1")
    );
    assert!(matches!(
        reloaded.countdown(),
        Countdown::Running { remaining_ms } if remaining_ms == 27 * 60 * 1000
    ));

    rank_fully(&mut reloaded, 15);
    let gate = SubmissionGate::new(Arc::new(MockBackend::for_kind(TestKind::Cmt, started(30))));
    gate.submit(&mut reloaded).await.unwrap();
    assert!(mirror.load("cmt_cand-7").unwrap().is_none());
}

#[tokio::test]
async fn pf16_deadline_passes_at_180_answers() {
    let dir = TempDir::new().unwrap();
    let mirror: Arc<dyn MirrorStore> = Arc::new(FileMirror::open(dir.path()).unwrap());
    let backend = Arc::new(MockBackend::for_kind(TestKind::Pf16, started(45)));
    let clock = Arc::new(ManualClock::new(t0()));

    let mut session = Session::load(
        TestKind::Pf16,
        "cand-9",
        backend.as_ref(),
        mirror.clone(),
        clock.clone(),
    )
    .await
    .unwrap();
    for question in 1..=180 {
        session
            .apply(SessionEvent::Choose {
                question,
                choice: Choice::B,
            })
            .unwrap();
    }

    clock.advance(Duration::minutes(45));
    assert_eq!(session.countdown(), Countdown::Elapsed);
    assert_eq!(session.state(), SessionState::Expired);

    let rejected = session.apply(SessionEvent::Choose {
        question: 181,
        choice: Choice::A,
    });
    assert_eq!(rejected, Err(SessionError::ReadOnly(SessionState::Expired)));
    assert_eq!(session.choice_of(180), Some(Choice::B));
    assert_eq!(session.answered_count(), 180);

    // The driver claims the final attempt right at the transition.
    let attempt = session.take_final_attempt().unwrap();
    let gate = SubmissionGate::new(backend.clone());
    let err = gate.submit_final(&mut session, attempt).await.unwrap_err();
    match err {
        SubmissionError::IncompleteAnswers(missing) => {
            assert_eq!(missing, vec![181, 182, 183, 184, 185])
        }
        other => panic!("expected IncompleteAnswers, got {other:?}"),
    }
    assert_eq!(backend.submit_count(), 0);
    assert!(session.is_highlighted(183));
    assert!(matches!(
        gate.submit(&mut session).await,
        Err(SubmissionError::SessionExpired)
    ));

    // Answers stay on disk for the server-side record.
    assert!(mirror.load("16pf_cand-9").unwrap().is_some());
}

#[tokio::test]
async fn expiry_seen_then_later_submit_is_refused() {
    let dir = TempDir::new().unwrap();
    let mirror: Arc<dyn MirrorStore> = Arc::new(FileMirror::open(dir.path()).unwrap());
    let backend = Arc::new(MockBackend::for_kind(TestKind::Pf16, started(45)));
    let clock = Arc::new(ManualClock::new(t0()));

    let mut session = Session::load(
        TestKind::Pf16,
        "cand-11",
        backend.as_ref(),
        mirror.clone(),
        clock.clone(),
    )
    .await
    .unwrap();
    for question in 1..=185 {
        session
            .apply(SessionEvent::Choose {
                question,
                choice: Choice::A,
            })
            .unwrap();
    }

    clock.advance(Duration::minutes(45));
    assert_eq!(session.countdown(), Countdown::Elapsed);

    // Nobody submitted at the transition; a minute later the attempt is gone.
    clock.advance(Duration::minutes(1));
    assert!(session.take_final_attempt().is_none());
    let gate = SubmissionGate::new(backend.clone());
    assert!(matches!(
        gate.submit(&mut session).await,
        Err(SubmissionError::SessionExpired)
    ));
    assert_eq!(backend.submit_count(), 0);
    assert!(mirror.load("16pf_cand-11").unwrap().is_some());
}

#[tokio::test]
async fn started_past_deadline_on_reload_never_submits() {
    let dir = TempDir::new().unwrap();
    let mirror: Arc<dyn MirrorStore> = Arc::new(FileMirror::open(dir.path()).unwrap());
    let backend = Arc::new(MockBackend::for_kind(TestKind::Pf16, started(45)));
    let clock = Arc::new(ManualClock::new(t0()));

    let mut first = Session::load(
        TestKind::Pf16,
        "cand-12",
        backend.as_ref(),
        mirror.clone(),
        clock.clone(),
    )
    .await
    .unwrap();
    for question in 1..=185 {
        first
            .apply(SessionEvent::Choose {
                question,
                choice: Choice::B,
            })
            .unwrap();
    }
    drop(first);

    // Server has not closed the session yet, but the deadline is days old.
    clock.advance(Duration::days(3));
    backend.set_deadline(DeadlineDescriptor {
        server_now: Some(t0() + Duration::days(3)),
        ..started(45)
    });
    let mut reloaded = Session::load(
        TestKind::Pf16,
        "cand-12",
        backend.as_ref(),
        mirror.clone(),
        clock.clone(),
    )
    .await
    .unwrap();
    assert_eq!(reloaded.state(), SessionState::Expired);
    assert_eq!(reloaded.answered_count(), 185);
    assert!(reloaded.take_final_attempt().is_none());

    let gate = SubmissionGate::new(backend.clone());
    assert!(matches!(
        gate.submit(&mut reloaded).await,
        Err(SubmissionError::SessionExpired)
    ));
    assert_eq!(backend.submit_count(), 0);
    assert!(mirror.load("16pf_cand-12").unwrap().is_some());
}

#[tokio::test]
async fn network_failure_then_retry_succeeds() {
    let dir = TempDir::new().unwrap();
    let mirror: Arc<dyn MirrorStore> = Arc::new(FileMirror::open(dir.path()).unwrap());
    let backend = Arc::new(MockBackend::for_kind(TestKind::Pf16, started(45)));
    backend.fail_next_submissions(1);
    let clock = Arc::new(ManualClock::new(t0()));

    let mut session = Session::load(
        TestKind::Pf16,
        "cand-3",
        backend.as_ref(),
        mirror.clone(),
        clock,
    )
    .await
    .unwrap();
    for question in 1..=185 {
        session
            .apply(SessionEvent::Choose {
                question,
                choice: Choice::C,
            })
            .unwrap();
    }

    let gate = SubmissionGate::new(backend.clone());
    let err = gate.submit(&mut session).await.unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(session.state(), SessionState::Started);
    assert!(mirror.load("16pf_cand-3").unwrap().is_some());

    let ack = gate.submit(&mut session).await.unwrap();
    assert_eq!(ack.status, "ok");
    assert_eq!(session.state(), SessionState::Completed);
    assert!(mirror.load("16pf_cand-3").unwrap().is_none());

    let payloads = backend.payloads();
    assert_eq!(payloads.len(), 2);
    assert_ne!(payloads[0].attempt_id, payloads[1].attempt_id);
    assert_eq!(payloads[1].answers.len(), 185);
}

#[tokio::test]
async fn completed_on_server_clears_leftover_mirror() {
    let dir = TempDir::new().unwrap();
    let mirror: Arc<dyn MirrorStore> = Arc::new(FileMirror::open(dir.path()).unwrap());
    let backend = MockBackend::for_kind(TestKind::Pf16, started(45));
    let clock = Arc::new(ManualClock::new(t0()));

    let mut session =
        Session::load(TestKind::Pf16, "cand-5", &backend, mirror.clone(), clock.clone())
            .await
            .unwrap();
    session
        .apply(SessionEvent::Choose {
            question: 1,
            choice: Choice::A,
        })
        .unwrap();
    assert!(mirror.load("16pf_cand-5").unwrap().is_some());

    backend.set_deadline(DeadlineDescriptor {
        state: SessionState::Completed,
        ..started(45)
    });
    let reloaded = Session::load(TestKind::Pf16, "cand-5", &backend, mirror.clone(), clock)
        .await
        .unwrap();
    assert_eq!(reloaded.state(), SessionState::Completed);
    assert!(mirror.load("16pf_cand-5").unwrap().is_none());
}
