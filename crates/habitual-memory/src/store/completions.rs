//! Daily completion log. Pending is derived from missing rows.

use super::{format_date, parse_date, parse_ts, Store};
use chrono::NaiveDate;
use habitual_core::{
    error::HabitualError,
    model::{CompletionOutcome, CompletionRecord, CompletionStatus, DayStatus, Habit},
};
use std::collections::BTreeMap;

fn is_fk_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_foreign_key_violation())
}

impl Store {
    /// Record `status` for a habit on `date`, replacing any earlier record.
    pub async fn record_completion(
        &self,
        habit_id: &str,
        date: NaiveDate,
        status: CompletionStatus,
    ) -> Result<CompletionOutcome, HabitualError> {
        let result = sqlx::query(
            "INSERT INTO completions (habit_id, log_date, status) VALUES (?, ?, ?) \
             ON CONFLICT(habit_id, log_date) DO UPDATE \
             SET status = excluded.status, updated_at = datetime('now') \
             WHERE completions.status != excluded.status",
        )
        .bind(habit_id)
        .bind(format_date(date))
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_fk_violation(&e) {
                HabitualError::NotFound(format!("habit {habit_id}"))
            } else {
                HabitualError::Memory(format!("record completion failed: {e}"))
            }
        })?;

        if result.rows_affected() > 0 {
            tracing::debug!("habit {habit_id} marked {} on {date}", status.as_str());
            Ok(CompletionOutcome::Recorded)
        } else {
            Ok(CompletionOutcome::Unchanged)
        }
    }

    /// Remove the record for `date`, returning the day to pending.
    pub async fn clear_completion(
        &self,
        habit_id: &str,
        date: NaiveDate,
    ) -> Result<bool, HabitualError> {
        let result = sqlx::query("DELETE FROM completions WHERE habit_id = ? AND log_date = ?")
            .bind(habit_id)
            .bind(format_date(date))
            .execute(&self.pool)
            .await
            .map_err(|e| HabitualError::Memory(format!("clear completion failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Status of a habit on one date.
    pub async fn day_status(
        &self,
        habit_id: &str,
        date: NaiveDate,
    ) -> Result<DayStatus, HabitualError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM completions WHERE habit_id = ? AND log_date = ?")
                .bind(habit_id)
                .bind(format_date(date))
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| HabitualError::Memory(format!("day status failed: {e}")))?;

        let record = row.map(|(s,)| s.parse::<CompletionStatus>()).transpose()?;
        Ok(DayStatus::from(record))
    }

    /// All records of a habit with `start <= date <= end`.
    pub async fn completions_between(
        &self,
        habit_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, CompletionStatus>, HabitualError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT log_date, status FROM completions \
             WHERE habit_id = ? AND log_date BETWEEN ? AND ? \
             ORDER BY log_date ASC",
        )
        .bind(habit_id)
        .bind(format_date(start))
        .bind(format_date(end))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("fetch completions failed: {e}")))?;

        rows.into_iter()
            .map(|(d, s)| Ok((parse_date(&d)?, s.parse::<CompletionStatus>()?)))
            .collect()
    }

    /// Every habit of an owner with its status on `date`.
    pub async fn statuses_on(
        &self,
        owner_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<(Habit, DayStatus)>, HabitualError> {
        #[allow(clippy::type_complexity)]
        let rows: Vec<(
            String,
            i64,
            String,
            Option<String>,
            Option<String>,
            String,
            Option<String>,
        )> = sqlx::query_as(
            "SELECT h.id, h.owner_id, h.name, h.description, h.category, h.created_at, c.status \
             FROM habits h \
             LEFT JOIN completions c ON c.habit_id = h.id AND c.log_date = ? \
             WHERE h.owner_id = ? \
             ORDER BY h.created_at ASC, h.rowid ASC",
        )
        .bind(format_date(date))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("statuses on date failed: {e}")))?;

        rows.into_iter()
            .map(
                |(id, owner_id, name, description, category, created_at, status)| {
                    let habit = Habit {
                        id,
                        owner_id,
                        name,
                        description,
                        category,
                        created_at: parse_ts(&created_at)?,
                    };
                    let record = status.map(|s| s.parse::<CompletionStatus>()).transpose()?;
                    Ok((habit, DayStatus::from(record)))
                },
            )
            .collect()
    }

    /// Completion history of an owner, newest first, optionally for one habit.
    pub async fn history(
        &self,
        owner_id: i64,
        habit_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<CompletionRecord>, HabitualError> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT c.habit_id, h.name, c.log_date, c.status \
             FROM completions c JOIN habits h ON h.id = c.habit_id \
             WHERE h.owner_id = ? AND (? IS NULL OR c.habit_id = ?) \
             ORDER BY c.log_date DESC, h.name ASC \
             LIMIT ? OFFSET ?",
        )
        .bind(owner_id)
        .bind(habit_id)
        .bind(habit_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("history failed: {e}")))?;

        rows.into_iter()
            .map(|(habit_id, habit_name, date, status)| {
                Ok(CompletionRecord {
                    habit_id,
                    habit_name,
                    date: parse_date(&date)?,
                    status: status.parse()?,
                })
            })
            .collect()
    }

    /// Number of records `history` can page through.
    pub async fn history_count(
        &self,
        owner_id: i64,
        habit_id: Option<&str>,
    ) -> Result<u64, HabitualError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM completions c JOIN habits h ON h.id = c.habit_id \
             WHERE h.owner_id = ? AND (? IS NULL OR c.habit_id = ?)",
        )
        .bind(owner_id)
        .bind(habit_id)
        .bind(habit_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("history count failed: {e}")))?;

        Ok(count as u64)
    }
}
