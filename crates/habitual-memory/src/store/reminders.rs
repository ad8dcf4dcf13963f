//! Reminder CRUD and the per-day fired marker.

use super::{format_date, parse_date, Store};
use chrono::NaiveDate;
use habitual_core::{error::HabitualError, model::Reminder};

type ReminderRow = (String, i64, i64, i64, bool, Option<String>, Option<String>);

const REMINDER_COLUMNS: &str =
    "r.habit_id, r.owner_id, r.hour, r.minute, r.enabled, r.last_fired_on, r.last_error";

fn reminder_from_row(row: ReminderRow) -> Result<Reminder, HabitualError> {
    let (habit_id, owner_id, hour, minute, enabled, last_fired_on, last_error) = row;
    Ok(Reminder {
        habit_id,
        owner_id,
        hour: hour as u32,
        minute: minute as u32,
        enabled,
        last_fired_on: last_fired_on.as_deref().map(parse_date).transpose()?,
        last_error,
    })
}

impl Store {
    /// Set (or overwrite) the reminder of a habit. The reminder is enabled.
    pub async fn set_reminder(
        &self,
        habit_id: &str,
        hour: u32,
        minute: u32,
    ) -> Result<Reminder, HabitualError> {
        if hour > 23 || minute > 59 {
            return Err(HabitualError::InvalidInput(format!(
                "invalid reminder time {hour:02}:{minute:02}"
            )));
        }

        // owner_id is copied from the habit so a reminder can never point at
        // someone else's habit. A new time of day drops the fired marker: the
        // marker only stands for the time it was written for.
        let result = sqlx::query(
            "INSERT INTO reminders (habit_id, owner_id, hour, minute, enabled) \
             SELECT id, owner_id, ?, ?, 1 FROM habits WHERE id = ? \
             ON CONFLICT(habit_id) DO UPDATE SET \
                 last_fired_on = CASE \
                     WHEN hour != excluded.hour OR minute != excluded.minute THEN NULL \
                     ELSE last_fired_on END, \
                 hour = excluded.hour, minute = excluded.minute, enabled = 1, \
                 last_error = NULL, updated_at = datetime('now')",
        )
        .bind(hour as i64)
        .bind(minute as i64)
        .bind(habit_id)
        .execute(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("set reminder failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(HabitualError::NotFound(format!("habit {habit_id}")));
        }

        self.get_reminder(habit_id)
            .await?
            .ok_or_else(|| HabitualError::NotFound(format!("reminder for habit {habit_id}")))
    }

    /// Enable or disable without forgetting the configured time.
    pub async fn set_reminder_enabled(
        &self,
        habit_id: &str,
        enabled: bool,
    ) -> Result<bool, HabitualError> {
        let result = sqlx::query(
            "UPDATE reminders SET enabled = ?, updated_at = datetime('now') WHERE habit_id = ?",
        )
        .bind(enabled)
        .bind(habit_id)
        .execute(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("toggle reminder failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete the reminder of a habit. Returns `true` if one existed.
    pub async fn remove_reminder(&self, habit_id: &str) -> Result<bool, HabitualError> {
        let result = sqlx::query("DELETE FROM reminders WHERE habit_id = ?")
            .bind(habit_id)
            .execute(&self.pool)
            .await
            .map_err(|e| HabitualError::Memory(format!("remove reminder failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_reminder(&self, habit_id: &str) -> Result<Option<Reminder>, HabitualError> {
        let row: Option<ReminderRow> = sqlx::query_as(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders r WHERE r.habit_id = ?"
        ))
        .bind(habit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("get reminder failed: {e}")))?;

        row.map(reminder_from_row).transpose()
    }

    /// Reminders of one owner, earliest time of day first.
    pub async fn reminders_for_owner(&self, owner_id: i64) -> Result<Vec<Reminder>, HabitualError> {
        let rows: Vec<ReminderRow> = sqlx::query_as(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders r \
             WHERE r.owner_id = ? ORDER BY r.hour ASC, r.minute ASC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("get reminders failed: {e}")))?;

        rows.into_iter().map(reminder_from_row).collect()
    }

    /// Snapshot of every enabled reminder whose habit still exists.
    pub async fn enabled_reminders(&self) -> Result<Vec<Reminder>, HabitualError> {
        let rows: Vec<ReminderRow> = sqlx::query_as(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders r \
             JOIN habits h ON h.id = r.habit_id \
             WHERE r.enabled = 1 \
             ORDER BY r.owner_id ASC, r.hour ASC, r.minute ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("get enabled reminders failed: {e}")))?;

        rows.into_iter().map(reminder_from_row).collect()
    }

    /// Write the fired marker after a delivery attempt. `error` is `None` on success.
    pub async fn mark_reminder_fired(
        &self,
        habit_id: &str,
        fired_on: NaiveDate,
        error: Option<&str>,
    ) -> Result<(), HabitualError> {
        sqlx::query("UPDATE reminders SET last_fired_on = ?, last_error = ? WHERE habit_id = ?")
            .bind(format_date(fired_on))
            .bind(error)
            .bind(habit_id)
            .execute(&self.pool)
            .await
            .map_err(|e| HabitualError::Memory(format!("mark reminder fired failed: {e}")))?;

        Ok(())
    }
}
