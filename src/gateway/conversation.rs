//! Per-user multi-step input state.
//!
//! Each user is `Idle` unless a command asked for confirmation. Pending
//! states expire after a timeout and are keyed by user id, so one user's
//! pending action is invisible to everyone else.

use chrono::{DateTime, TimeDelta, Utc};
use habitual_core::traits::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How long a confirmation prompt stays valid.
pub const CONFIRM_TIMEOUT: TimeDelta = TimeDelta::minutes(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    ConfirmDelete {
        habit_id: String,
        habit_name: String,
        expires_at: DateTime<Utc>,
    },
}

/// Pending delete taken out of a user's state by `/yes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub habit_id: String,
    pub habit_name: String,
}

pub struct Conversations {
    states: Mutex<HashMap<i64, ConversationState>>,
    clock: Arc<dyn Clock>,
    timeout: TimeDelta,
}

impl Conversations {
    pub fn new(clock: Arc<dyn Clock>, timeout: TimeDelta) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            clock,
            timeout,
        }
    }

    fn states(&self) -> MutexGuard<'_, HashMap<i64, ConversationState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state of a user. Expired states read as `Idle`.
    pub fn state(&self, user_id: i64) -> ConversationState {
        let now = self.clock.now();
        let mut states = self.states();
        let expired = matches!(
            states.get(&user_id),
            Some(ConversationState::ConfirmDelete { expires_at, .. }) if *expires_at <= now
        );
        if expired {
            states.remove(&user_id);
        }
        states
            .get(&user_id)
            .cloned()
            .unwrap_or(ConversationState::Idle)
    }

    /// Ask the user to confirm deleting a habit. Replaces any pending state.
    pub fn begin_delete(&self, user_id: i64, habit_id: &str, habit_name: &str) {
        let expires_at = self.clock.now() + self.timeout;
        self.states().insert(
            user_id,
            ConversationState::ConfirmDelete {
                habit_id: habit_id.to_string(),
                habit_name: habit_name.to_string(),
                expires_at,
            },
        );
    }

    /// Confirm: returns the pending delete if it has not expired. The user
    /// is back to `Idle` either way.
    pub fn confirm_delete(&self, user_id: i64) -> Option<PendingDelete> {
        let now = self.clock.now();
        match self.states().remove(&user_id)? {
            ConversationState::ConfirmDelete {
                habit_id,
                habit_name,
                expires_at,
            } if expires_at > now => Some(PendingDelete {
                habit_id,
                habit_name,
            }),
            _ => None,
        }
    }

    /// Drop any pending state. Returns `true` if something live was pending.
    pub fn cancel(&self, user_id: i64) -> bool {
        let live = self.state(user_id) != ConversationState::Idle;
        self.states().remove(&user_id);
        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use habitual_core::clock::ManualClock;

    fn setup() -> (Conversations, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            DateTime::parse_from_rfc3339("2026-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        ));
        (Conversations::new(clock.clone(), CONFIRM_TIMEOUT), clock)
    }

    #[test]
    fn test_default_is_idle() {
        let (conv, _) = setup();
        assert_eq!(conv.state(1), ConversationState::Idle);
        assert!(conv.confirm_delete(1).is_none());
        assert!(!conv.cancel(1));
    }

    #[test]
    fn test_confirm_delete_flow() {
        let (conv, _) = setup();
        conv.begin_delete(1, "abc", "Read");
        assert!(matches!(
            conv.state(1),
            ConversationState::ConfirmDelete { .. }
        ));
        let pending = conv.confirm_delete(1).unwrap();
        assert_eq!(pending.habit_id, "abc");
        assert_eq!(pending.habit_name, "Read");
        assert_eq!(conv.state(1), ConversationState::Idle);
        assert!(conv.confirm_delete(1).is_none());
    }

    #[test]
    fn test_state_does_not_leak_across_users() {
        let (conv, _) = setup();
        conv.begin_delete(1, "abc", "Read");
        assert_eq!(conv.state(2), ConversationState::Idle);
        assert!(conv.confirm_delete(2).is_none());
        assert!(conv.confirm_delete(1).is_some());
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let (conv, _) = setup();
        conv.begin_delete(1, "abc", "Read");
        assert!(conv.cancel(1));
        assert_eq!(conv.state(1), ConversationState::Idle);
        assert!(conv.confirm_delete(1).is_none());
    }

    #[test]
    fn test_pending_state_expires() {
        let (conv, clock) = setup();
        conv.begin_delete(1, "abc", "Read");
        clock.advance(TimeDelta::minutes(4));
        assert!(matches!(
            conv.state(1),
            ConversationState::ConfirmDelete { .. }
        ));
        clock.advance(TimeDelta::minutes(1));
        assert_eq!(conv.state(1), ConversationState::Idle);

        conv.begin_delete(1, "abc", "Read");
        clock.advance(TimeDelta::minutes(6));
        assert!(conv.confirm_delete(1).is_none());
    }
}
