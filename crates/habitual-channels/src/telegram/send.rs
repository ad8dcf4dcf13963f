//! Message sending and command registration.

use super::TelegramChannel;
use crate::utils::split_message;
use habitual_core::error::HabitualError;
use tracing::{info, warn};

/// Telegram rejects messages longer than this.
pub(crate) const MAX_MESSAGE_LEN: usize = 4096;

impl TelegramChannel {
    /// Send a plain-text message to a specific chat.
    pub(crate) async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), HabitualError> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let url = self.method_url("sendMessage");
            let body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });

            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| HabitualError::Channel(format!("telegram send failed: {e}")))?;

            let status = resp.status();
            if !status.is_success() {
                let error_text = resp.text().await.unwrap_or_default();
                return Err(HabitualError::Channel(format!(
                    "telegram send failed ({status}): {error_text}"
                )));
            }
        }

        Ok(())
    }

    /// Register bot commands with Telegram so users see an autocomplete menu.
    /// Best-effort: logs failures but does not propagate errors.
    pub(crate) async fn register_commands(&self) {
        let commands = serde_json::json!({
            "commands": [
                { "command": "help", "description": "Show available commands" },
                { "command": "add", "description": "Add a habit: /add name | description | category" },
                { "command": "habits", "description": "List your habits" },
                { "command": "today", "description": "Today's status of every habit" },
                { "command": "done", "description": "Mark a habit done today" },
                { "command": "skip", "description": "Mark a habit skipped today" },
                { "command": "undo", "description": "Clear today's mark for a habit" },
                { "command": "history", "description": "Recent completion history" },
                { "command": "stats", "description": "Completion rate and streaks" },
                { "command": "remind", "description": "Daily reminder: /remind habit HH:MM" },
                { "command": "unremind", "description": "Remove a habit's reminder" },
                { "command": "reminders", "description": "List your reminders" },
                { "command": "rename", "description": "Rename a habit" },
                { "command": "edit", "description": "Edit a habit's description or category" },
                { "command": "delete", "description": "Delete a habit and its history" },
                { "command": "cancel", "description": "Cancel the current action" },
                { "command": "refresh_membership", "description": "Re-check channel membership" },
            ]
        });

        let url = self.method_url("setMyCommands");
        match self.client.post(&url).json(&commands).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("registered Telegram bot commands");
            }
            Ok(resp) => {
                let body = resp.text().await.unwrap_or_default();
                warn!("failed to register Telegram bot commands: {body}");
            }
            Err(e) => {
                warn!("failed to register Telegram bot commands: {e}");
            }
        }
    }
}
