//! Line commands accepted by `psytest take`.

use psytest_core::model::{Choice, TestKind};
use psytest_core::ranking::Letter;
use psytest_core::session::SessionEvent;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Events(Vec<SessionEvent>),
    Show,
    Overview,
    Help,
    Submit,
    Quit,
}

pub const HELP: &str = "\
Commands:
  a | b | c          answer the current 16PF question
  <n> <a|b|c>        answer 16PF question n
  c=5                give CMT option c rank 5 (swaps with its holder)
  a=5,b=4,c=3,...    several ranks at once
  c=  | c-           remove the rank of option c
  n | next           next question
  p | prev           previous question
  go <n>             jump to question n
  page <n>           jump to page n
  list               answered/unanswered overview
  show               show the current question
  submit             submit answers
  q | quit           leave (answers stay saved)";

/// Parse `line` for a `kind` session positioned at question `current`.
pub fn parse(kind: TestKind, current: u32, line: &str) -> Result<Command, String> {
    let line = line.trim().to_lowercase();
    let words: Vec<&str> = line.split_whitespace().collect();

    match words.as_slice() {
        [] | ["show"] => Ok(Command::Show),
        ["help"] | ["?"] => Ok(Command::Help),
        ["list"] => Ok(Command::Overview),
        ["submit"] => Ok(Command::Submit),
        ["q"] | ["quit"] | ["exit"] => Ok(Command::Quit),
        ["n"] | ["next"] => Ok(Command::Events(vec![SessionEvent::Next])),
        ["p"] | ["prev"] | ["previous"] => Ok(Command::Events(vec![SessionEvent::Previous])),
        ["go", n] => Ok(Command::Events(vec![SessionEvent::GoTo(
            parse_one_based(n)? - 1,
        )])),
        ["page", n] => Ok(Command::Events(vec![SessionEvent::GoToPage(
            parse_one_based(n)? - 1,
        )])),
        _ => match kind {
            TestKind::Pf16 => parse_choice(current, &words),
            TestKind::Cmt => parse_ranks(current, &line),
        },
    }
}

fn parse_one_based(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(format!("expected a number from 1, got '{raw}'")),
    }
}

fn parse_choice(current: u32, words: &[&str]) -> Result<Command, String> {
    let (question, choice) = match words {
        [choice] => (current, *choice),
        [question, choice] => (
            question
                .parse::<u32>()
                .map_err(|_| format!("invalid question number '{question}'"))?,
            *choice,
        ),
        _ => return Err(unknown(words)),
    };
    let choice: Choice = choice.parse()?;
    Ok(Command::Events(vec![SessionEvent::Choose { question, choice }]))
}

fn parse_ranks(current: u32, line: &str) -> Result<Command, String> {
    let mut events = Vec::new();
    for part in line.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (letter, rank) = part
            .split_once('=')
            .or_else(|| part.strip_suffix('-').map(|l| (l, "")))
            .ok_or_else(|| format!("unknown command '{line}', try 'help'"))?;
        let letter: Letter = letter.parse()?;
        let rank = rank.trim();
        if rank.is_empty() {
            events.push(SessionEvent::Unrank {
                question: current,
                letter,
            });
        } else {
            let rank = rank
                .parse::<u8>()
                .map_err(|_| format!("invalid rank '{rank}'"))?;
            events.push(SessionEvent::Rank {
                question: current,
                letter,
                rank,
            });
        }
    }
    if events.is_empty() {
        return Err(format!("unknown command '{line}', try 'help'"));
    }
    Ok(Command::Events(events))
}

fn unknown(words: &[&str]) -> String {
    format!("unknown command '{}', try 'help'", words.join(" "))
}
