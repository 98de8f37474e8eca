//! CMT forced-ranking rules.
//!
//! A ranking assigns each of the five lettered options a distinct priority
//! in 1..=5. Edits go through [`Ranking::assign`], which swaps ranks so no
//! value is ever held twice; [`is_valid_ranking`] decides completeness.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::model::Answer;

/// Allowed rank values.
pub const RANKS: RangeInclusive<u8> = 1..=5;

/// Option letter of a CMT group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Letter {
    A,
    B,
    C,
    D,
    E,
}

impl Letter {
    pub const ALL: [Letter; 5] = [Letter::A, Letter::B, Letter::C, Letter::D, Letter::E];
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Letter::A => 'a',
            Letter::B => 'b',
            Letter::C => 'c',
            Letter::D => 'd',
            Letter::E => 'e',
        };
        write!(f, "{c}")
    }
}

impl FromStr for Letter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a" => Ok(Letter::A),
            "b" => Ok(Letter::B),
            "c" => Ok(Letter::C),
            "d" => Ok(Letter::D),
            "e" => Ok(Letter::E),
            other => Err(format!("unknown option letter: {other}")),
        }
    }
}

/// Letter → rank mapping for one CMT group. May be partial while the
/// candidate is still editing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ranking(BTreeMap<Letter, u8>);

impl Ranking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rank currently held by `letter`.
    pub fn get(&self, letter: Letter) -> Option<u8> {
        self.0.get(&letter).copied()
    }

    /// Letter currently holding `rank`, if any.
    pub fn holder_of(&self, rank: u8) -> Option<Letter> {
        self.0
            .iter()
            .find(|&(_, &r)| r == rank)
            .map(|(&letter, _)| letter)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Letter, u8)> + '_ {
        self.0.iter().map(|(&l, &r)| (l, r))
    }

    /// Assign `rank` to `letter`, swapping with whichever letter held it.
    ///
    /// The displaced letter receives `letter`'s previous rank, or becomes
    /// unranked if `letter` had none.
    pub fn assign(&mut self, letter: Letter, rank: u8) -> Result<(), SessionError> {
        if !RANKS.contains(&rank) {
            return Err(SessionError::InvalidRank(rank));
        }

        let previous = self.get(letter);
        if previous == Some(rank) {
            return Ok(());
        }

        if let Some(other) = self.holder_of(rank) {
            match previous {
                Some(old) => {
                    self.0.insert(other, old);
                }
                None => {
                    self.0.remove(&other);
                }
            }
        }
        self.0.insert(letter, rank);
        Ok(())
    }

    /// Remove `letter`'s rank.
    pub fn clear(&mut self, letter: Letter) {
        self.0.remove(&letter);
    }

    /// Whether the ranking is a full permutation of 1..=5.
    pub fn is_complete(&self) -> bool {
        is_valid_ranking(self)
    }
}

impl FromIterator<(Letter, u8)> for Ranking {
    fn from_iter<I: IntoIterator<Item = (Letter, u8)>>(iter: I) -> Self {
        Ranking(iter.into_iter().collect())
    }
}

impl fmt::Display for Ranking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(l, r)| format!("{l}={r}")).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Parses `a=5,b=4,...`. Does not check validity.
impl FromStr for Ranking {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut map = BTreeMap::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (letter, rank) = part
                .split_once('=')
                .ok_or_else(|| format!("expected letter=rank, got {part}"))?;
            let letter: Letter = letter.parse()?;
            let rank: u8 = rank
                .trim()
                .parse()
                .map_err(|_| format!("invalid rank in {part}"))?;
            if map.insert(letter, rank).is_some() {
                return Err(format!("letter {letter} ranked twice"));
            }
        }
        Ok(Ranking(map))
    }
}

/// Valid iff all five letters are ranked and the ranks are exactly
/// {1,2,3,4,5}.
pub fn is_valid_ranking(ranking: &Ranking) -> bool {
    if ranking.len() != Letter::ALL.len() {
        return false;
    }
    let values: BTreeSet<u8> = ranking.0.values().copied().collect();
    values.len() == Letter::ALL.len() && values.into_iter().eq(RANKS)
}

/// One candidate edit on a CMT group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankEdit {
    Assign { letter: Letter, rank: u8 },
    Clear { letter: Letter },
}

/// Result of reducing a ranking edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankReduction {
    /// The working ranking after the edit, possibly partial.
    pub ranking: Ranking,
    /// The answer to persist, or `None` if the group is now unanswered.
    pub answer: Option<Answer>,
}

/// Pure reducer for ranking edits: `(current, edit) → (ranking, answer)`.
pub fn reduce_ranking(mut current: Ranking, edit: RankEdit) -> Result<RankReduction, SessionError> {
    match edit {
        RankEdit::Assign { letter, rank } => current.assign(letter, rank)?,
        RankEdit::Clear { letter } => current.clear(letter),
    }
    let answer = is_valid_ranking(&current).then(|| Answer::Ranking(current.clone()));
    Ok(RankReduction {
        ranking: current,
        answer,
    })
}
