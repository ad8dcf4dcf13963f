//! Gateway: the event loop connecting channels to the command handlers.
//!
//! Includes: per-sender ordering, the membership gate, and graceful shutdown.

pub mod access;
pub mod conversation;

use crate::commands::{self, Command, CommandContext};
use access::{AccessDecision, AccessGate};
use chrono_tz::Tz;
use conversation::Conversations;
use habitual_core::{
    message::{IncomingMessage, OutgoingMessage},
    traits::Channel,
};
use habitual_engine::{Scheduler, Stats};
use habitual_memory::Store;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// The central gateway that routes messages between channels and commands.
pub struct Gateway {
    channels: HashMap<String, Arc<dyn Channel>>,
    store: Store,
    scheduler: Scheduler,
    stats: Stats,
    access: AccessGate,
    conversations: Conversations,
    tz: Tz,
    stats_window_days: u32,
    /// Senders with a command in progress. New messages are buffered here.
    active_senders: Mutex<HashMap<String, Vec<IncomingMessage>>>,
}

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channels: HashMap<String, Arc<dyn Channel>>,
        store: Store,
        scheduler: Scheduler,
        stats: Stats,
        access: AccessGate,
        conversations: Conversations,
        tz: Tz,
        stats_window_days: u32,
    ) -> Self {
        Self {
            channels,
            store,
            scheduler,
            stats,
            access,
            conversations,
            tz,
            stats_window_days,
            active_senders: Mutex::new(HashMap::new()),
        }
    }

    /// Run the main event loop until ctrl-c.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "Habitual gateway running | channels: {} | timezone: {} | membership gate: {}",
            self.channels.keys().cloned().collect::<Vec<_>>().join(", "),
            self.tz,
            if self.access.is_enabled() {
                "enforced"
            } else {
                "disabled"
            },
        );

        let (tx, mut rx) = mpsc::channel::<IncomingMessage>(256);

        for (name, channel) in &self.channels {
            let mut channel_rx = channel
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("failed to start channel {name}: {e}"))?;
            let tx = tx.clone();
            let channel_name = name.clone();

            tokio::spawn(async move {
                while let Some(msg) = channel_rx.recv().await {
                    if tx.send(msg).await.is_err() {
                        info!("gateway receiver dropped, stopping {channel_name} forwarder");
                        break;
                    }
                }
            });

            info!("Channel started: {name}");
        }

        drop(tx);

        loop {
            tokio::select! {
                incoming = rx.recv() => {
                    let Some(incoming) = incoming else {
                        warn!("all channels closed");
                        break;
                    };
                    let gw = self.clone();
                    tokio::spawn(async move {
                        gw.dispatch_message(incoming).await;
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Dispatch a message: buffer if the sender is busy, otherwise process.
    ///
    /// Commands of one sender run one at a time and in arrival order.
    async fn dispatch_message(self: Arc<Self>, incoming: IncomingMessage) {
        let sender_key = format!("{}:{}", incoming.channel, incoming.sender_id);

        {
            let mut active = self.active_senders.lock().await;
            if let Some(buffer) = active.get_mut(&sender_key) {
                buffer.push(incoming);
                debug!("buffered message from {sender_key} (command in progress)");
                return;
            }
            active.insert(sender_key.clone(), Vec::new());
        }

        self.handle_message(&incoming).await;

        loop {
            let next = {
                let mut active = self.active_senders.lock().await;
                match active.get_mut(&sender_key) {
                    Some(buf) if !buf.is_empty() => Some(buf.remove(0)),
                    _ => {
                        active.remove(&sender_key);
                        None
                    }
                }
            };

            match next {
                Some(buffered) => self.handle_message(&buffered).await,
                None => break,
            }
        }
    }

    /// Route one message to its command and send the reply.
    pub(crate) async fn handle_message(&self, incoming: &IncomingMessage) {
        let text = incoming.text.trim();
        if text.is_empty() {
            return;
        }

        let Some(cmd) = Command::parse(text) else {
            let reply = if text.starts_with('/') {
                "Unknown command. Send /help to see what I can do."
            } else {
                "I only understand commands. Send /help to see them."
            };
            self.send_text(incoming, reply).await;
            return;
        };

        if cmd.requires_membership() {
            let decision = self.access.check(incoming.sender_id).await;
            if decision != AccessDecision::Granted {
                info!(
                    "refused {cmd:?} from {}: {decision:?}",
                    incoming.sender_id
                );
                let denial = self.access.denial_text(&decision);
                self.send_text(incoming, &denial).await;
                return;
            }
        }

        let ctx = CommandContext {
            store: &self.store,
            scheduler: &self.scheduler,
            stats: &self.stats,
            conversations: &self.conversations,
            access: &self.access,
            sender_id: incoming.sender_id,
            text,
            tz: self.tz,
            stats_window_days: self.stats_window_days,
        };
        let reply = commands::handle(cmd, &ctx).await;
        debug!("{cmd:?} from {} handled", incoming.sender_id);
        self.send_text(incoming, &reply).await;
    }

    /// Graceful shutdown: cancel timers, stop channels.
    async fn shutdown(&self) {
        info!("Shutting down...");

        self.scheduler.shutdown();

        for (name, channel) in &self.channels {
            if let Err(e) = channel.stop().await {
                warn!("failed to stop channel {name}: {e}");
            }
        }

        self.store.close().await;
        info!("Shutdown complete.");
    }

    /// Send a plain text message back to the sender.
    async fn send_text(&self, incoming: &IncomingMessage, text: &str) {
        let Some(channel) = self.channels.get(&incoming.channel) else {
            warn!("no channel named {} to reply on", incoming.channel);
            return;
        };
        if let Err(e) = channel.send(OutgoingMessage::reply(incoming, text)).await {
            warn!("failed to send reply to {}: {e}", incoming.sender_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use habitual_core::{
        clock::ManualClock,
        config::{MembershipConfig, MemoryConfig, SchedulerConfig},
        error::HabitualError,
        traits::{DeliverySink, MembershipAuthority},
    };
    use habitual_engine::MembershipCache;
    use std::sync::atomic::{AtomicU64, Ordering};
    use uuid::Uuid;

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    async fn test_store() -> Store {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "__habitual_gateway_test_{}_{}__",
            std::process::id(),
            id
        ));
        let _ = std::fs::remove_dir_all(&dir);
        let db_path = dir.join("test.db").to_string_lossy().to_string();
        Store::new(&MemoryConfig { db_path }).await.unwrap()
    }

    #[derive(Default)]
    struct RecordingChannel {
        sent: std::sync::Mutex<Vec<OutgoingMessage>>,
    }

    impl RecordingChannel {
        fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|m| m.text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "test"
        }

        async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, HabitualError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn send(&self, message: OutgoingMessage) -> Result<(), HabitualError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn stop(&self) -> Result<(), HabitualError> {
            Ok(())
        }
    }

    #[async_trait]
    impl DeliverySink for RecordingChannel {
        async fn notify(&self, user_id: i64, _: &str, text: &str) -> Result<(), HabitualError> {
            self.send(OutgoingMessage {
                text: text.to_string(),
                reply_target: user_id,
            })
            .await
        }
    }

    struct Members(Vec<i64>);

    #[async_trait]
    impl MembershipAuthority for Members {
        async fn check_membership(&self, user_id: i64, _: &str) -> Result<bool, HabitualError> {
            Ok(self.0.contains(&user_id))
        }
    }

    async fn gateway(members: Option<Vec<i64>>) -> (Gateway, Arc<RecordingChannel>) {
        let store = test_store().await;
        let channel = Arc::new(RecordingChannel::default());
        let clock = Arc::new(ManualClock::new(
            DateTime::parse_from_rfc3339("2026-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        ));
        let tz = chrono_tz::UTC;
        let scheduler = Scheduler::new(
            store.clone(),
            channel.clone(),
            clock.clone(),
            tz,
            SchedulerConfig::default(),
        );
        let access = match members {
            Some(ids) => {
                let config = MembershipConfig {
                    required_channels: vec!["@habits_club".into()],
                    ..Default::default()
                };
                let cache = MembershipCache::from_config(
                    store.clone(),
                    Arc::new(Members(ids)),
                    clock.clone(),
                    &config,
                );
                AccessGate::new(cache, &config)
            }
            None => AccessGate::disabled(),
        };
        let mut channels: HashMap<String, Arc<dyn Channel>> = HashMap::new();
        channels.insert("test".into(), channel.clone());
        let gw = Gateway::new(
            channels,
            store.clone(),
            scheduler,
            Stats::new(store, clock.clone(), tz),
            access,
            Conversations::new(clock, conversation::CONFIRM_TIMEOUT),
            tz,
            7,
        );
        (gw, channel)
    }

    fn msg(sender_id: i64, text: &str) -> IncomingMessage {
        IncomingMessage {
            id: Uuid::new_v4(),
            channel: "test".into(),
            sender_id,
            sender_name: None,
            text: text.into(),
            timestamp: Utc::now(),
            reply_target: sender_id,
            is_group: false,
        }
    }

    #[tokio::test]
    async fn test_command_reply_goes_to_sender() {
        let (gw, channel) = gateway(None).await;
        gw.handle_message(&msg(1, "/add Read")).await;
        gw.handle_message(&msg(1, "/done Read")).await;

        let sent = channel.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].text.contains("Added \"Read\""));
        assert!(sent[1].text.contains("done for today"));
        assert!(sent.iter().all(|m| m.reply_target == 1));
    }

    #[tokio::test]
    async fn test_plain_text_and_unknown_command_get_hint() {
        let (gw, channel) = gateway(None).await;
        gw.handle_message(&msg(1, "hello")).await;
        gw.handle_message(&msg(1, "/dance")).await;
        gw.handle_message(&msg(1, "   ")).await;

        let texts = channel.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].contains("/help"));
        assert!(texts[1].starts_with("Unknown command"));
    }

    #[tokio::test]
    async fn test_gate_refuses_non_members() {
        let (gw, channel) = gateway(Some(vec![1])).await;
        gw.handle_message(&msg(2, "/add Read")).await;
        gw.handle_message(&msg(2, "/help")).await;
        gw.handle_message(&msg(1, "/add Read")).await;

        let texts = channel.texts();
        assert!(texts[0].contains("https://t.me/habits_club"), "{}", texts[0]);
        assert!(texts[1].contains("/add"));
        assert!(texts[2].contains("Added \"Read\""));
        assert!(gw.store.list_habits(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_processes_buffered_messages_in_order() {
        let (gw, channel) = gateway(None).await;
        let gw = Arc::new(gw);
        let first = tokio::spawn(gw.clone().dispatch_message(msg(1, "/add Read")));
        let second = tokio::spawn(gw.clone().dispatch_message(msg(1, "/done Read")));
        first.await.unwrap();
        second.await.unwrap();

        let texts = channel.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].contains("Added"));
        assert!(texts[1].contains("done for today"));
        assert!(gw.active_senders.lock().await.is_empty());
    }
}
