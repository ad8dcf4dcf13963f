//! Clocks and timezone-aware wall-clock arithmetic.
//!
//! Reminder instants are never stored; they are recomputed from a local
//! time-of-day in the configured zone every time a timer is armed.

use async_trait::async_trait;
use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use std::time::Duration;
use tokio::sync::watch;

use crate::traits::Clock;

/// Longest single sleep of the system clock. Waking up periodically lets
/// wall-clock corrections (NTP, suspend/resume) move the deadline.
const MAX_SLEEP_SLICE: Duration = Duration::from_secs(60);

/// Real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        loop {
            let now = Utc::now();
            if now >= deadline {
                return;
            }
            let remaining = (deadline - now).to_std().unwrap_or_default();
            tokio::time::sleep(remaining.min(MAX_SLEEP_SLICE)).await;
        }
    }
}

/// Virtual clock: time only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: watch::Sender<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        let (now, _) = watch::channel(start);
        Self { now }
    }

    /// Jump to an absolute instant, waking every sleeper whose deadline passed.
    pub fn set(&self, to: DateTime<Utc>) {
        self.now.send_replace(to);
    }

    pub fn advance(&self, by: TimeDelta) {
        self.now.send_modify(|now| *now += by);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.borrow()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        let mut rx = self.now.subscribe();
        loop {
            if *rx.borrow_and_update() >= deadline {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Calendar date of `instant` in `tz`.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Map a local wall-clock reading to an absolute instant.
///
/// Ambiguous readings (DST fall-back) take the earlier instant. Readings that
/// fall into a DST gap move forward to the first valid minute after the gap.
pub fn resolve_local(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(t) => t.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => (1..=24 * 60)
            .map(|m| local + TimeDelta::minutes(m))
            .find_map(|candidate| tz.from_local_datetime(&candidate).earliest())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&local)),
    }
}

/// First instant strictly after `now` whose local time-of-day in `tz` is `at`.
///
/// A time that already passed today (or is exactly now) yields tomorrow.
pub fn next_fire_after(now: DateTime<Utc>, tz: Tz, at: NaiveTime) -> DateTime<Utc> {
    local_date(now, tz)
        .iter_days()
        .take(3)
        .map(|day| resolve_local(tz, day.and_time(at)))
        .find(|candidate| *candidate > now)
        .unwrap_or_else(|| now + TimeDelta::days(1))
}
