//! Retry eligibility and backoff for queued entries.
//!
//! The delay before retrying an entry that has failed `n` times is
//! `base_delay × 2^n`. The queue's own eligibility check uses that formula
//! uncapped; the engine builds a [`RetryPolicy`] with `max_delay` so that it
//! never waits longer than the configured ceiling.

use driftsync_types::{SyncEntry, Timestamp};
use std::time::Duration;

/// Exponential backoff delay for an entry that has failed `attempts` times.
///
/// Saturates at [`Duration::MAX`] instead of overflowing.
pub fn backoff_delay(base: Duration, attempts: u32) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    2u32.checked_pow(attempts)
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}

/// Rules deciding when a failed entry may be pushed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Entries with this many failed attempts are never retried.
    pub max_retries: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Double the delay on every failure; otherwise use `base_delay` each time.
    pub exponential: bool,
    /// Ceiling on the computed delay.
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    /// Exponential policy with no ceiling.
    pub fn uncapped(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            exponential: true,
            max_delay: None,
        }
    }

    /// Set a ceiling on the computed delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Turn exponential growth on or off.
    pub fn with_exponential(mut self, exponential: bool) -> Self {
        self.exponential = exponential;
        self
    }

    /// Delay to wait after `attempts` failures.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let delay = if self.exponential {
            backoff_delay(self.base_delay, attempts)
        } else {
            self.base_delay
        };
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Whether the entry has used up its attempts.
    pub fn is_exhausted(&self, entry: &SyncEntry) -> bool {
        entry.attempts >= self.max_retries
    }

    /// Earliest time the entry may be pushed again.
    ///
    /// `None` when the entry is synced or exhausted.
    pub fn next_attempt_at(&self, entry: &SyncEntry) -> Option<Timestamp> {
        if entry.synced || self.is_exhausted(entry) {
            return None;
        }
        match entry.last_attempt {
            None => Some(Timestamp::ZERO),
            Some(last) => Some(last.saturating_add(self.delay_for(entry.attempts))),
        }
    }

    /// Whether the entry should be included in a push at `now`.
    ///
    /// Never-attempted entries are always eligible.
    pub fn is_eligible(&self, entry: &SyncEntry, now: Timestamp) -> bool {
        self.next_attempt_at(entry).is_some_and(|at| now >= at)
    }
}
