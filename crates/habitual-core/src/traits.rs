use crate::{
    error::HabitualError,
    message::{IncomingMessage, OutgoingMessage},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Messaging Channel trait: where commands come from and replies go.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    /// Returns a receiver that yields incoming messages.
    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<IncomingMessage>, HabitualError>;

    /// Send a response back through this channel.
    async fn send(&self, message: OutgoingMessage) -> Result<(), HabitualError>;

    /// Graceful shutdown.
    async fn stop(&self) -> Result<(), HabitualError>;
}

/// Delivery sink: the only way the scheduler reaches a user.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Deliver a rendered reminder to `user_id` for `habit_id`.
    async fn notify(&self, user_id: i64, habit_id: &str, text: &str) -> Result<(), HabitualError>;
}

/// External system of record for channel/group membership.
#[async_trait]
pub trait MembershipAuthority: Send + Sync {
    async fn check_membership(&self, user_id: i64, channel_id: &str)
        -> Result<bool, HabitualError>;
}

/// Source of "now" and of timed waits. Substitutable with a virtual clock in tests.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Resolve once `now() >= deadline`.
    async fn sleep_until(&self, deadline: DateTime<Utc>);
}
