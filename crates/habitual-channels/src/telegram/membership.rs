//! Reminder delivery and channel membership checks through the Bot API.

use super::types::{TgChatMember, TgResponse};
use super::TelegramChannel;
use async_trait::async_trait;
use habitual_core::{
    error::HabitualError,
    traits::{DeliverySink, MembershipAuthority},
};
use tracing::debug;

/// `getChatMember` descriptions meaning "not in this chat" rather than a failure.
const NOT_A_MEMBER: &[&str] = &["user not found", "member not found", "PARTICIPANT_ID_INVALID"];

/// Interpret a `getChatMember` response.
pub(crate) fn membership_from_response(
    resp: TgResponse<TgChatMember>,
    channel_id: &str,
) -> Result<bool, HabitualError> {
    if resp.ok {
        return resp
            .result
            .map(|m| m.counts_as_member())
            .ok_or_else(|| HabitualError::Channel("getChatMember returned no result".into()));
    }

    let description = resp.description.unwrap_or_default();
    if NOT_A_MEMBER.iter().any(|d| description.contains(d)) {
        return Ok(false);
    }
    Err(HabitualError::Channel(format!(
        "getChatMember for {channel_id} failed ({}): {description}",
        resp.error_code.unwrap_or_default()
    )))
}

#[async_trait]
impl DeliverySink for TelegramChannel {
    /// A private chat with the bot has the same id as the user.
    async fn notify(&self, user_id: i64, habit_id: &str, text: &str) -> Result<(), HabitualError> {
        debug!("telegram: delivering reminder for habit {habit_id} to {user_id}");
        self.send_text(user_id, text).await
    }
}

#[async_trait]
impl MembershipAuthority for TelegramChannel {
    async fn check_membership(
        &self,
        user_id: i64,
        channel_id: &str,
    ) -> Result<bool, HabitualError> {
        let url = self.method_url("getChatMember");
        let resp: TgResponse<TgChatMember> = self
            .client
            .get(&url)
            .query(&[("chat_id", channel_id.to_string()), ("user_id", user_id.to_string())])
            .send()
            .await
            .map_err(|e| HabitualError::Channel(format!("telegram getChatMember failed: {e}")))?
            .json()
            .await
            .map_err(|e| {
                HabitualError::Channel(format!("telegram getChatMember parse failed: {e}"))
            })?;

        let member = membership_from_response(resp, channel_id)?;
        debug!("telegram: {user_id} member of {channel_id}: {member}");
        Ok(member)
    }
}
