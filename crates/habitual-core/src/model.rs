//! Domain records shared by the store, the engine, and the gateway.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HabitualError;

/// A user-defined recurring activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Habit {
    /// First eight characters of the id, enough to address a habit in commands.
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(8)]
    }
}

/// Persisted outcome of a habit on one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Done,
    Skipped,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Skipped => "skipped",
        }
    }
}

impl FromStr for CompletionStatus {
    type Err = HabitualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "done" => Ok(Self::Done),
            "skipped" => Ok(Self::Skipped),
            other => Err(HabitualError::InvalidInput(format!(
                "unknown completion status '{other}'"
            ))),
        }
    }
}

/// Status of a habit on a date. `Pending` is never stored: it is what the
/// absence of a completion record means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayStatus {
    Done,
    Skipped,
    Pending,
}

impl DayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Pending => "pending",
        }
    }
}

impl From<Option<CompletionStatus>> for DayStatus {
    fn from(record: Option<CompletionStatus>) -> Self {
        match record {
            Some(CompletionStatus::Done) => Self::Done,
            Some(CompletionStatus::Skipped) => Self::Skipped,
            None => Self::Pending,
        }
    }
}

impl fmt::Display for DayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of writing a completion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// A new record was written or an existing one changed status.
    Recorded,
    /// The date already carried the same status.
    Unchanged,
}

/// One completion record, as listed in history views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    pub habit_id: String,
    pub habit_name: String,
    pub date: NaiveDate,
    pub status: CompletionStatus,
}

/// Daily reminder for a habit. At most one per habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub habit_id: String,
    pub owner_id: i64,
    pub hour: u32,
    pub minute: u32,
    pub enabled: bool,
    /// Local date of the last fire attempt.
    pub last_fired_on: Option<NaiveDate>,
    pub last_error: Option<String>,
}

impl Reminder {
    /// Wall-clock time of day in the configured timezone.
    pub fn time_of_day(&self) -> Result<NaiveTime, HabitualError> {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).ok_or_else(|| {
            HabitualError::InvalidInput(format!(
                "invalid reminder time {:02}:{:02} for habit {}",
                self.hour, self.minute, self.habit_id
            ))
        })
    }
}

/// Parse `HH:MM` (24h) into hour and minute.
pub fn parse_time_of_day(s: &str) -> Result<(u32, u32), HabitualError> {
    let t = NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| HabitualError::InvalidInput(format!("expected HH:MM, got '{s}'")))?;
    use chrono::Timelike;
    Ok((t.hour(), t.minute()))
}

/// Cached answer from the membership authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipEntry {
    pub user_id: i64,
    pub channel_id: String,
    pub is_member: bool,
    pub checked_at: DateTime<Utc>,
}
