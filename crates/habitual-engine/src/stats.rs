//! Completion rate and streaks over a fixed look-back window.
//!
//! Nothing here is cached. Every call re-reads the completion log for the
//! window and derives the numbers from scratch.

use chrono::{NaiveDate, TimeDelta};
use chrono_tz::Tz;
use habitual_core::{
    clock::local_date,
    error::HabitualError,
    model::{CompletionStatus, DayStatus},
    traits::Clock,
};
use habitual_memory::Store;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Statistics for one habit over one window.
#[derive(Debug, Clone, PartialEq)]
pub struct HabitStats {
    pub habit_id: String,
    pub window_days: u32,
    pub done_count: u32,
    pub skipped_count: u32,
    /// `done_count / window_days`. Pending and skipped days both count as
    /// not done.
    pub completion_rate: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// Derive stats for the window `[today - (window_days - 1), today]`.
///
/// `records` may contain dates outside the window; they are ignored.
pub fn compute_window(
    habit_id: &str,
    records: &BTreeMap<NaiveDate, CompletionStatus>,
    today: NaiveDate,
    window_days: u32,
) -> Result<HabitStats, HabitualError> {
    let start = window_start(today, window_days)?;

    let days: Vec<DayStatus> = start
        .iter_days()
        .take(window_days as usize)
        .map(|d| DayStatus::from(records.get(&d).copied()))
        .collect();

    let done_count = days.iter().filter(|s| **s == DayStatus::Done).count() as u32;
    let skipped_count = days.iter().filter(|s| **s == DayStatus::Skipped).count() as u32;

    let current_streak = days
        .iter()
        .rev()
        .take_while(|s| **s == DayStatus::Done)
        .count() as u32;

    let (longest_streak, _) = days.iter().fold((0u32, 0u32), |(best, run), s| {
        if *s == DayStatus::Done {
            (best.max(run + 1), run + 1)
        } else {
            (best, 0)
        }
    });

    Ok(HabitStats {
        habit_id: habit_id.to_string(),
        window_days,
        done_count,
        skipped_count,
        completion_rate: f64::from(done_count) / f64::from(window_days),
        current_streak,
        longest_streak,
    })
}

fn window_start(today: NaiveDate, window_days: u32) -> Result<NaiveDate, HabitualError> {
    if window_days == 0 {
        return Err(HabitualError::InvalidInput(
            "stats window must be at least one day".to_string(),
        ));
    }
    today
        .checked_sub_signed(TimeDelta::days(i64::from(window_days) - 1))
        .ok_or_else(|| HabitualError::InvalidInput(format!("window of {window_days} days")))
}

/// Statistics engine bound to a store, a clock, and the configured zone.
#[derive(Clone)]
pub struct Stats {
    store: Store,
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl Stats {
    pub fn new(store: Store, clock: Arc<dyn Clock>, tz: Tz) -> Self {
        Self { store, clock, tz }
    }

    /// Today's date in the configured zone.
    pub fn today(&self) -> NaiveDate {
        local_date(self.clock.now(), self.tz)
    }

    /// Stats for one habit over the window ending today.
    pub async fn compute(
        &self,
        habit_id: &str,
        window_days: u32,
    ) -> Result<HabitStats, HabitualError> {
        let today = self.today();
        let start = window_start(today, window_days)?;
        if self.store.get_habit(habit_id).await?.is_none() {
            return Err(HabitualError::NotFound(format!("habit {habit_id}")));
        }
        let records = self.store.completions_between(habit_id, start, today).await?;
        compute_window(habit_id, &records, today, window_days)
    }

    /// Stats for every habit of an owner, in creation order.
    pub async fn compute_for_owner(
        &self,
        owner_id: i64,
        window_days: u32,
    ) -> Result<Vec<(String, HabitStats)>, HabitualError> {
        let today = self.today();
        let start = window_start(today, window_days)?;
        let mut out = Vec::new();
        for habit in self.store.list_habits(owner_id).await? {
            let records = self
                .store
                .completions_between(&habit.id, start, today)
                .await?;
            let stats = compute_window(&habit.id, &records, today, window_days)?;
            out.push((habit.name, stats));
        }
        Ok(out)
    }
}
