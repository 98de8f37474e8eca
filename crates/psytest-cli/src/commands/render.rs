//! Plain-text views of a session.

use std::fmt::Write;

use psytest_core::model::{Question, TestKind};
use psytest_core::ranking::Letter;
use psytest_core::session::Session;
use psytest_core::tracker::QuestionStatus;

/// Header line: test, position, progress and countdown.
pub fn header(session: &mut Session) -> String {
    let countdown = session.countdown();
    let total = session.questions().len();
    format!(
        "[{}] question {}/{} | answered {}/{} | time left {} | {}",
        session.kind(),
        session.position() + 1,
        total,
        session.answered_count(),
        total,
        countdown,
        session.state(),
    )
}

/// The current question with its options and the candidate's input.
pub fn question(session: &Session) -> String {
    let q = session.current_question();
    let mut out = format!("\n{}. {}\n", q.number, q.prompt);
    match session.kind() {
        TestKind::Pf16 => {
            let selected = session.choice_of(q.number).map(|c| c.to_string());
            for (code, label) in option_labels(q, TestKind::Pf16) {
                let mark = if selected.as_deref() == Some(code.as_str()) {
                    "(x)"
                } else {
                    "( )"
                };
                let _ = writeln!(out, "  {mark} {code}) {label}");
            }
        }
        TestKind::Cmt => {
            let ranking = session.ranking_of(q.number);
            for ((code, label), letter) in option_labels(q, TestKind::Cmt)
                .into_iter()
                .zip(Letter::ALL)
            {
                let rank = ranking
                    .and_then(|r| r.get(letter))
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "-".into());
                let _ = writeln!(out, "  [{rank}] {code}) {label}");
            }
        }
    }
    out
}

/// Answered/unanswered marks for the current page (16PF) or all groups (CMT).
pub fn overview(session: &Session) -> String {
    let paging = session.tracker().paging();
    let numbers = match session.kind() {
        TestKind::Pf16 => {
            paging.questions_on_page(paging.page_of(session.current_question().number))
        }
        TestKind::Cmt => 1..=session.questions().len() as u32,
    };

    let mut out = String::new();
    for number in numbers {
        let mark = match session.status_of(number) {
            QuestionStatus::Answered => "+",
            QuestionStatus::Unanswered if session.is_highlighted(number) => "!",
            QuestionStatus::Unanswered => ".",
        };
        let current = if session.is_current_page(number) && session.kind() == TestKind::Cmt {
            ">"
        } else {
            " "
        };
        let _ = write!(out, "{current}{number:>3}{mark} ");
    }
    if session.kind() == TestKind::Pf16 {
        let _ = write!(
            out,
            "\npage {}/{}",
            paging.page_of(session.current_question().number) + 1,
            paging.page_count()
        );
    }
    out
}

/// Comma-separated question numbers, shortened after `limit` entries.
pub fn question_list(numbers: &[u32], limit: usize) -> String {
    let shown: Vec<String> = numbers.iter().take(limit).map(u32::to_string).collect();
    let mut out = shown.join(", ");
    if numbers.len() > limit {
        let _ = write!(out, " (+{} more)", numbers.len() - limit);
    }
    out
}

fn option_labels(q: &Question, kind: TestKind) -> Vec<(String, String)> {
    if q.options.is_empty() {
        ["a", "b", "c", "d", "e"][..kind.option_count()]
            .iter()
            .map(|c| (c.to_string(), String::new()))
            .collect()
    } else {
        q.options
            .iter()
            .map(|o| (o.code.clone(), o.label.clone()))
            .collect()
    }
}
