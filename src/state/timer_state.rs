//! Countdown state machine

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::clock::format_hms;

/// Phase of the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    /// No countdown configured.
    Idle,
    /// Counting down toward the session lock.
    Running,
    /// Reached zero; the lock fired and a reset is awaited.
    Expired,
}

/// A command was rejected by the state machine or its gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// Malformed or zero requested duration/increment.
    InvalidDuration(String),
    /// Start requested while a countdown is already running.
    AlreadyRunning,
    /// Start requested after expiry, before the reset acknowledgment.
    AwaitingReset,
    /// Extend requested with no running countdown.
    NotRunning,
    /// Wrong credential on the reset gate.
    BadCredential,
    /// State lock failure, only reachable if a holder panicked.
    Internal(String),
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::InvalidDuration(detail) => write!(f, "invalid duration: {}", detail),
            TimerError::AlreadyRunning => write!(f, "a countdown is already running"),
            TimerError::AwaitingReset => write!(f, "countdown expired, reset it first"),
            TimerError::NotRunning => write!(f, "no countdown is running"),
            TimerError::BadCredential => write!(f, "reset denied: wrong credential"),
            TimerError::Internal(detail) => write!(f, "internal state error: {}", detail),
        }
    }
}

/// Countdown state.
///
/// Remaining time is derived from `now - started_at` on demand instead of
/// being decremented by ticks, so tick jitter and suspend gaps never
/// accumulate drift. Invariant: `started_at` is `Some` iff the phase is
/// [`TimerPhase::Running`].
///
/// Every time-dependent method takes `now` explicitly; callers pass
/// `Utc::now()` and tests pass fixed timestamps.
#[derive(Debug, Clone)]
pub struct TimerState {
    phase: TimerPhase,
    original_duration_seconds: u64,
    started_at: Option<DateTime<Utc>>,
}

impl TimerState {
    /// Create a new idle timer.
    pub fn new() -> Self {
        Self {
            phase: TimerPhase::Idle,
            original_duration_seconds: 0,
            started_at: None,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn original_duration_seconds(&self) -> u64 {
        self.original_duration_seconds
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Start a countdown of `duration_seconds` at `now`.
    pub fn start(&mut self, now: DateTime<Utc>, duration_seconds: u64) -> Result<(), TimerError> {
        match self.phase {
            TimerPhase::Running => return Err(TimerError::AlreadyRunning),
            TimerPhase::Expired => return Err(TimerError::AwaitingReset),
            TimerPhase::Idle => {}
        }

        if duration_seconds == 0 {
            return Err(TimerError::InvalidDuration(
                "duration must be greater than zero".to_string(),
            ));
        }

        self.phase = TimerPhase::Running;
        self.original_duration_seconds = duration_seconds;
        self.started_at = Some(now);
        Ok(())
    }

    /// Resume a previously persisted running countdown.
    ///
    /// The caller is responsible for having checked that the countdown has
    /// not already expired; an idle timer is the only valid starting point.
    pub fn resume(
        &mut self,
        started_at: DateTime<Utc>,
        original_duration_seconds: u64,
    ) -> Result<(), TimerError> {
        if self.phase != TimerPhase::Idle {
            return Err(TimerError::AlreadyRunning);
        }

        self.phase = TimerPhase::Running;
        self.original_duration_seconds = original_duration_seconds;
        self.started_at = Some(started_at);
        Ok(())
    }

    /// Extend the running countdown by `seconds`.
    ///
    /// The original duration is rebased to `remaining + seconds` with
    /// `started_at = now`, so total remaining time grows by exactly the
    /// increment no matter how much has already elapsed.
    pub fn extend(&mut self, now: DateTime<Utc>, seconds: u64) -> Result<(), TimerError> {
        if self.phase != TimerPhase::Running {
            return Err(TimerError::NotRunning);
        }

        if seconds == 0 {
            return Err(TimerError::InvalidDuration(
                "increment must be greater than zero".to_string(),
            ));
        }

        self.original_duration_seconds = self.remaining_seconds(now) + seconds;
        self.started_at = Some(now);
        Ok(())
    }

    /// Whole seconds elapsed since the countdown started, clamped to >= 0.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        match self.started_at {
            Some(started_at) => now.signed_duration_since(started_at).num_seconds().max(0) as u64,
            None => 0,
        }
    }

    /// Whole seconds left, clamped to >= 0. Zero unless running.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        match self.phase {
            TimerPhase::Running => self
                .original_duration_seconds
                .saturating_sub(self.elapsed_seconds(now)),
            TimerPhase::Idle | TimerPhase::Expired => 0,
        }
    }

    /// Progress ratio `elapsed / original`, capped at 1.0.
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        match self.phase {
            TimerPhase::Idle => 0.0,
            TimerPhase::Expired => 1.0,
            TimerPhase::Running => {
                if self.original_duration_seconds == 0 {
                    return 0.0;
                }
                let ratio =
                    self.elapsed_seconds(now) as f64 / self.original_duration_seconds as f64;
                ratio.min(1.0)
            }
        }
    }

    /// Move a running countdown to `Expired` if its remaining time hit zero.
    /// Returns whether the transition happened on this call.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.phase == TimerPhase::Running && self.remaining_seconds(now) == 0 {
            self.phase = TimerPhase::Expired;
            self.started_at = None;
            return true;
        }
        false
    }

    /// Clear all fields back to idle. The credential gate lives in the
    /// application state, not here.
    pub fn reset(&mut self) {
        self.phase = TimerPhase::Idle;
        self.original_duration_seconds = 0;
        self.started_at = None;
    }

    /// Point-in-time view of the countdown for display and notifications.
    pub fn snapshot(&self, now: DateTime<Utc>) -> TimerSnapshot {
        let remaining_seconds = self.remaining_seconds(now);
        TimerSnapshot {
            phase: self.phase,
            original_duration_seconds: self.original_duration_seconds,
            remaining_seconds,
            display: format_hms(remaining_seconds),
            progress: self.progress(now),
            started_at: self.started_at,
        }
    }
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Derived view of a [`TimerState`] at a specific instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerSnapshot {
    pub phase: TimerPhase,
    pub original_duration_seconds: u64,
    pub remaining_seconds: u64,
    pub display: String,
    pub progress: f64,
    pub started_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn start_yields_full_remaining() {
        let mut timer = TimerState::new();
        timer.start(t0(), 90).unwrap();

        assert_eq!(timer.phase(), TimerPhase::Running);
        assert_eq!(timer.remaining_seconds(t0()), 90);
        assert_eq!(timer.progress(t0()), 0.0);
    }

    #[test]
    fn zero_duration_is_rejected() {
        let mut timer = TimerState::new();
        let err = timer.start(t0(), 0).unwrap_err();

        assert!(matches!(err, TimerError::InvalidDuration(_)));
        assert_eq!(timer.phase(), TimerPhase::Idle);
    }

    #[test]
    fn start_while_running_is_rejected() {
        let mut timer = TimerState::new();
        timer.start(t0(), 60).unwrap();

        assert_eq!(timer.start(t0(), 30), Err(TimerError::AlreadyRunning));
        assert_eq!(timer.original_duration_seconds(), 60);
    }

    #[test]
    fn remaining_never_increases_and_never_goes_negative() {
        let mut timer = TimerState::new();
        timer.start(t0(), 10).unwrap();

        let mut last = timer.remaining_seconds(t0());
        for offset in 1..15 {
            let now = t0() + Duration::seconds(offset);
            let remaining = timer.remaining_seconds(now);
            assert!(remaining <= last);
            last = remaining;
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn remaining_clamps_on_clock_skew() {
        let mut timer = TimerState::new();
        timer.start(t0(), 10).unwrap();

        // now before started_at: elapsed clamps to zero
        let before = t0() - Duration::seconds(30);
        assert_eq!(timer.remaining_seconds(before), 10);
    }

    #[test]
    fn extend_adds_exactly_the_increment() {
        let mut timer = TimerState::new();
        timer.start(t0(), 3600).unwrap();

        // 25 minutes in, add 30 minutes
        let now = t0() + Duration::seconds(25 * 60);
        let before = timer.remaining_seconds(now);
        timer.extend(now, 1800).unwrap();

        assert_eq!(timer.remaining_seconds(now), before + 1800);
        assert_eq!(timer.started_at(), Some(now));
    }

    #[test]
    fn two_hour_extends_on_an_hour() {
        // start 01:00:00, apply +1 Hour twice right away
        let mut timer = TimerState::new();
        timer.start(t0(), 3600).unwrap();
        timer.extend(t0(), 3600).unwrap();
        timer.extend(t0(), 3600).unwrap();

        assert_eq!(timer.remaining_seconds(t0()), 3 * 3600);
    }

    #[test]
    fn extend_requires_running() {
        let mut timer = TimerState::new();
        assert_eq!(timer.extend(t0(), 300), Err(TimerError::NotRunning));

        timer.start(t0(), 5).unwrap();
        timer.expire_if_due(t0() + Duration::seconds(5));
        assert_eq!(
            timer.extend(t0() + Duration::seconds(6), 300),
            Err(TimerError::NotRunning)
        );
    }

    #[test]
    fn five_second_countdown_expires_after_five_ticks() {
        let mut timer = TimerState::new();
        timer.start(t0(), 5).unwrap();

        for offset in 1..5 {
            let now = t0() + Duration::seconds(offset);
            assert!(!timer.expire_if_due(now), "tick {} should not expire", offset);
        }

        let now = t0() + Duration::seconds(5);
        assert!(timer.expire_if_due(now));
        assert_eq!(timer.phase(), TimerPhase::Expired);
        assert_eq!(timer.remaining_seconds(now), 0);
        assert_eq!(timer.progress(now), 1.0);

        // transition fires only once
        assert!(!timer.expire_if_due(now + Duration::seconds(1)));
    }

    #[test]
    fn start_after_expiry_requires_reset() {
        let mut timer = TimerState::new();
        timer.start(t0(), 1).unwrap();
        timer.expire_if_due(t0() + Duration::seconds(1));

        assert_eq!(
            timer.start(t0() + Duration::seconds(2), 60),
            Err(TimerError::AwaitingReset)
        );

        timer.reset();
        assert_eq!(timer.phase(), TimerPhase::Idle);
        timer.start(t0() + Duration::seconds(3), 60).unwrap();
    }

    #[test]
    fn progress_is_capped() {
        let mut timer = TimerState::new();
        timer.start(t0(), 10).unwrap();

        assert_eq!(timer.progress(t0() + Duration::seconds(5)), 0.5);
        assert_eq!(timer.progress(t0() + Duration::seconds(60)), 1.0);
    }

    #[test]
    fn snapshot_formats_remaining() {
        let mut timer = TimerState::new();
        timer.start(t0(), 3661).unwrap();

        let snap = timer.snapshot(t0() + Duration::seconds(1));
        assert_eq!(snap.phase, TimerPhase::Running);
        assert_eq!(snap.remaining_seconds, 3660);
        assert_eq!(snap.display, "01:01:00");
    }
}
