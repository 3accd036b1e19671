//! Fixed-window request counting.
//!
//! A window opens on the first observation and stays open for exactly
//! `duration`. The first observation after it closes opens a fresh window
//! with a count of 1. Expiry is evaluated lazily on access; nothing ticks in
//! the background.
//!
//! Fixed windows can under-count a burst that straddles a boundary. That is
//! accepted behavior here, not a defect.

use chrono::{DateTime, TimeDelta, Utc};

/// Count of requests inside one open window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    count: u32,
    started_at: DateTime<Utc>,
}

impl Window {
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Result of observing one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Count after this request was added.
    pub count: u32,
    /// Configured limit for the window.
    pub limit: u32,
}

impl Observation {
    /// True once the count is strictly above the limit.
    ///
    /// A count equal to the limit is still within quota.
    pub fn exceeded(&self) -> bool {
        self.count > self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}

/// Window policy: a fixed duration paired with a limit.
///
/// The counter holds no per-client state; callers own the [`Window`] slot and
/// pass it in, so the slot can sit behind whatever lock guards the client.
#[derive(Debug, Clone, Copy)]
pub struct WindowCounter {
    duration: TimeDelta,
    limit: u32,
}

impl WindowCounter {
    pub fn new(duration: TimeDelta, limit: u32) -> Self {
        Self { duration, limit }
    }

    pub fn hourly(limit: u32) -> Self {
        Self::new(TimeDelta::hours(1), limit)
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(TimeDelta::minutes(1), limit)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count one request at `now`.
    pub fn observe(&self, slot: &mut Option<Window>, now: DateTime<Utc>) -> Observation {
        let count = if let Some(window) = slot.as_mut().filter(|w| self.is_live(w, now)) {
            window.count = window.count.saturating_add(1);
            window.count
        } else {
            *slot = Some(Window {
                count: 1,
                started_at: now,
            });
            1
        };

        Observation {
            count,
            limit: self.limit,
        }
    }

    /// Current count without recording anything. Absent or expired windows
    /// read as 0.
    pub fn peek(&self, slot: Option<&Window>, now: DateTime<Utc>) -> u32 {
        slot.filter(|window| self.is_live(window, now))
            .map_or(0, |window| window.count)
    }

    /// Time until the window closes; zero when absent or already expired.
    pub fn resets_in(&self, slot: Option<&Window>, now: DateTime<Utc>) -> TimeDelta {
        slot.filter(|window| self.is_live(window, now))
            .map_or(TimeDelta::zero(), |window| {
                window.started_at + self.duration - now
            })
    }

    pub fn is_live(&self, window: &Window, now: DateTime<Utc>) -> bool {
        now - window.started_at < self.duration
    }
}
