//! Membership cache rows. Freshness is decided by the caller, not here.

use super::{format_ts, parse_ts, Store};
use habitual_core::{error::HabitualError, model::MembershipEntry};

impl Store {
    pub async fn get_membership(
        &self,
        user_id: i64,
        channel_id: &str,
    ) -> Result<Option<MembershipEntry>, HabitualError> {
        let row: Option<(bool, String)> = sqlx::query_as(
            "SELECT is_member, checked_at FROM membership_cache \
             WHERE user_id = ? AND channel_id = ?",
        )
        .bind(user_id)
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("get membership failed: {e}")))?;

        row.map(|(is_member, checked_at)| {
            Ok(MembershipEntry {
                user_id,
                channel_id: channel_id.to_string(),
                is_member,
                checked_at: parse_ts(&checked_at)?,
            })
        })
        .transpose()
    }

    /// Insert or replace the cached answer for (user, channel).
    pub async fn put_membership(&self, entry: &MembershipEntry) -> Result<(), HabitualError> {
        sqlx::query(
            "INSERT INTO membership_cache (user_id, channel_id, is_member, checked_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(user_id, channel_id) DO UPDATE SET \
                 is_member = excluded.is_member, checked_at = excluded.checked_at",
        )
        .bind(entry.user_id)
        .bind(&entry.channel_id)
        .bind(entry.is_member)
        .bind(format_ts(entry.checked_at))
        .execute(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("put membership failed: {e}")))?;

        Ok(())
    }

    /// Drop every cached answer for a user. Returns the number of rows removed.
    pub async fn delete_memberships_for_user(&self, user_id: i64) -> Result<u64, HabitualError> {
        let result = sqlx::query("DELETE FROM membership_cache WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| HabitualError::Memory(format!("delete memberships failed: {e}")))?;

        Ok(result.rows_affected())
    }
}
