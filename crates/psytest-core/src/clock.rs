//! Drift-corrected countdown.
//!
//! The server reports its own "now" and an absolute deadline. At
//! construction we record `offset = server_now - local_now`; each tick then
//! computes `deadline - (local_now + offset)`. Nothing is decremented, so a
//! wrong local clock or a delayed timer cannot make the countdown drift.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::model::{DeadlineDescriptor, SessionState};

/// Source of local "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The host system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One reading of the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    /// The server has not started the session yet. Not the same as zero.
    NotStarted,
    /// No usable deadline; the server alone enforces the limit.
    Unlimited,
    Running { remaining_ms: u64 },
    /// Time is up, or the session is already closed.
    Elapsed,
}

impl Countdown {
    /// Remaining milliseconds, or `None` when no numeric value applies.
    pub fn remaining_ms(&self) -> Option<u64> {
        match self {
            Countdown::NotStarted | Countdown::Unlimited => None,
            Countdown::Running { remaining_ms } => Some(*remaining_ms),
            Countdown::Elapsed => Some(0),
        }
    }

    pub fn is_elapsed(&self) -> bool {
        matches!(self, Countdown::Elapsed)
    }

    /// `MM:SS`, or `--:--` when there is no deadline to count down to.
    pub fn label(&self) -> String {
        match self {
            Countdown::NotStarted | Countdown::Unlimited => "--:--".to_string(),
            Countdown::Running { remaining_ms } => format_mm_ss(*remaining_ms),
            Countdown::Elapsed => format_mm_ss(0),
        }
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Render milliseconds as `MM:SS`, truncating partial seconds.
pub fn format_mm_ss(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Remaining milliseconds for a deadline, given the server offset and the
/// current local time. Floored at zero.
pub fn remaining_ms(offset: Duration, deadline: DateTime<Utc>, local_now: DateTime<Utc>) -> u64 {
    let corrected_now = local_now + offset;
    (deadline - corrected_now).num_milliseconds().max(0) as u64
}

/// Live countdown for one session load.
pub struct ClockSync {
    clock: Arc<dyn Clock>,
    offset: Duration,
    deadline: Option<DateTime<Utc>>,
    cap_ms: Option<u64>,
    state: SessionState,
}

impl ClockSync {
    /// Capture the server/local offset from `descriptor`.
    pub fn new(descriptor: &DeadlineDescriptor, clock: Arc<dyn Clock>) -> Self {
        let local_now = clock.now();
        let offset = match descriptor.server_now {
            Some(server_now) => server_now - local_now,
            None => {
                tracing::warn!("server time unavailable, countdown uses local clock");
                Duration::zero()
            }
        };

        if descriptor.state == SessionState::Started && descriptor.deadline.is_none() {
            tracing::warn!("deadline unavailable, time limit enforced by server only");
        }

        tracing::debug!(
            offset_ms = offset.num_milliseconds(),
            state = %descriptor.state,
            "clock synchronized"
        );

        Self {
            clock,
            offset,
            deadline: descriptor.deadline,
            cap_ms: descriptor.max_minutes.map(|m| u64::from(m) * 60_000),
            state: descriptor.state,
        }
    }

    /// Server clock minus local clock at construction.
    pub fn offset(&self) -> Duration {
        self.offset
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Local clock reading, uncorrected.
    pub(crate) fn local_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Read the countdown now.
    pub fn remaining(&self) -> Countdown {
        self.remaining_at(self.clock.now())
    }

    /// Read the countdown as of `local_now`.
    pub fn remaining_at(&self, local_now: DateTime<Utc>) -> Countdown {
        match self.state {
            SessionState::Pending => Countdown::NotStarted,
            SessionState::Completed | SessionState::Expired => Countdown::Elapsed,
            SessionState::Started => {
                let Some(deadline) = self.deadline else {
                    return Countdown::Unlimited;
                };
                let mut ms = remaining_ms(self.offset, deadline, local_now);
                if let Some(cap) = self.cap_ms {
                    ms = ms.min(cap);
                }
                if ms == 0 {
                    Countdown::Elapsed
                } else {
                    Countdown::Running { remaining_ms: ms }
                }
            }
        }
    }

    /// Pin the countdown to a terminal state.
    pub(crate) fn close(&mut self, state: SessionState) {
        debug_assert!(state.is_terminal());
        self.state = state;
    }
}

impl fmt::Debug for ClockSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockSync")
            .field("offset_ms", &self.offset.num_milliseconds())
            .field("deadline", &self.deadline)
            .field("cap_ms", &self.cap_ms)
            .field("state", &self.state)
            .finish()
    }
}
