//! Telegram Bot API channel.
//!
//! Uses long polling via `getUpdates` and `sendMessage` for responses. The
//! same bot delivers reminders and answers membership checks with
//! `getChatMember`.
//! Docs: <https://core.telegram.org/bots/api>

mod membership;
mod polling;
pub(crate) mod send;
pub(crate) mod types;


use habitual_core::config::TelegramConfig;
use std::sync::Arc;
use tokio::sync::Mutex;

const API_HOST: &str = "https://api.telegram.org";

/// The one bot Habitual runs as: it reads commands from private chats,
/// pushes reminder messages to their owners, and is asked whether a user
/// belongs to the required channels.
pub struct TelegramChannel {
    /// `https://api.telegram.org/bot<token>`; every method hangs off it.
    api_root: String,
    client: reqwest::Client,
    /// Senders outside this list are dropped before parsing. Empty admits everyone.
    allowed_users: Vec<i64>,
    /// `offset` for the next `getUpdates` call: last seen update_id + 1.
    next_offset: Arc<Mutex<Option<i64>>>,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            api_root: format!("{API_HOST}/bot{}", config.bot_token),
            client: reqwest::Client::new(),
            allowed_users: config.allowed_users,
            next_offset: Arc::new(Mutex::new(None)),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_root)
    }
}
