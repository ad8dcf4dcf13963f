//! Long-polling update loop and Channel trait implementation.

use super::types::{TgMessage, TgResponse, TgUpdate};
use super::TelegramChannel;
use async_trait::async_trait;
use habitual_core::{
    error::HabitualError,
    message::{IncomingMessage, OutgoingMessage},
    traits::Channel,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MAX_BACKOFF_SECS: u64 = 60;

/// Turn a Telegram message into an incoming message, or `None` if it should
/// be ignored (no text, no sender, unauthorized sender, group chat).
pub(crate) fn to_incoming(msg: TgMessage, allowed_users: &[i64]) -> Option<IncomingMessage> {
    let text = msg.text?;
    let user = msg.from?;

    if !allowed_users.is_empty() && !allowed_users.contains(&user.id) {
        warn!("ignoring message from unauthorized user {}", user.id);
        return None;
    }

    // Habits are personal; only private chats are served.
    if matches!(msg.chat.chat_type.as_str(), "group" | "supergroup" | "channel") {
        debug!("telegram: ignoring group message from chat {}", msg.chat.id);
        return None;
    }

    let sender_name = if let Some(ref un) = user.username {
        format!("@{un}")
    } else if let Some(ref ln) = user.last_name {
        format!("{} {ln}", user.first_name)
    } else {
        user.first_name.clone()
    };

    Some(IncomingMessage {
        id: Uuid::new_v4(),
        channel: "telegram".to_string(),
        sender_id: user.id,
        sender_name: Some(sender_name),
        text,
        timestamp: chrono::Utc::now(),
        reply_target: msg.chat.id,
        is_group: false,
    })
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, HabitualError> {
        self.register_commands().await;

        let (tx, rx) = mpsc::channel(64);
        let client = self.client.clone();
        let api_root = self.api_root.clone();
        let allowed_users = self.allowed_users.clone();
        let next_offset = self.next_offset.clone();

        info!("Telegram channel starting long polling...");

        tokio::spawn(async move {
            let mut backoff_secs: u64 = 1;

            loop {
                let offset = *next_offset.lock().await;

                let mut url = format!("{api_root}/getUpdates?timeout=30");
                if let Some(off) = offset {
                    url.push_str(&format!("&offset={off}"));
                }

                let failure = match client
                    .get(&url)
                    .timeout(Duration::from_secs(35))
                    .send()
                    .await
                {
                    Err(e) => Some(format!("telegram poll error: {e}")),
                    Ok(resp) => match resp.json::<TgResponse<Vec<TgUpdate>>>().await {
                        Err(e) => Some(format!("telegram parse error: {e}")),
                        Ok(body) if !body.ok => Some(format!(
                            "telegram API error: {}",
                            body.description.unwrap_or_default()
                        )),
                        Ok(body) => {
                            // Successful poll -- reset backoff.
                            backoff_secs = 1;

                            let updates = body.result.unwrap_or_default();
                            if let Some(last_update) = updates.last() {
                                *next_offset.lock().await = Some(last_update.update_id + 1);
                            }

                            for update in updates {
                                let Some(incoming) = update
                                    .message
                                    .and_then(|m| to_incoming(m, &allowed_users))
                                else {
                                    continue;
                                };
                                if tx.send(incoming).await.is_err() {
                                    info!("telegram channel receiver dropped, stopping poll");
                                    return;
                                }
                            }
                            None
                        }
                    },
                };

                if let Some(reason) = failure {
                    error!("{reason} (retry in {backoff_secs}s)");
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), HabitualError> {
        self.send_text(message.reply_target, &message.text).await
    }

    async fn stop(&self) -> Result<(), HabitualError> {
        info!("Telegram channel stopped");
        Ok(())
    }
}
