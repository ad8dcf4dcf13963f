//! Access gate: required channel membership before gated commands run.

use habitual_core::{config::MembershipConfig, error::HabitualError};
use habitual_engine::MembershipCache;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    /// The user is missing from at least one required channel.
    NotMember,
    /// The authority could not answer and the gate fails closed.
    Unavailable,
}

pub struct AccessGate {
    cache: Option<MembershipCache>,
    required: Vec<String>,
    fail_open: bool,
}

impl AccessGate {
    /// Gate that lets everyone through.
    pub fn disabled() -> Self {
        Self {
            cache: None,
            required: Vec::new(),
            fail_open: false,
        }
    }

    pub fn new(cache: MembershipCache, config: &MembershipConfig) -> Self {
        if !config.is_enabled() {
            return Self::disabled();
        }
        Self {
            cache: Some(cache),
            required: config.required_channels.clone(),
            fail_open: config.fail_open,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub async fn check(&self, user_id: i64) -> AccessDecision {
        let Some(cache) = &self.cache else {
            return AccessDecision::Granted;
        };
        match cache.is_member_of_all(user_id, &self.required).await {
            Ok(true) => AccessDecision::Granted,
            Ok(false) => AccessDecision::NotMember,
            Err(e) => self.on_error(user_id, e),
        }
    }

    /// Drop cached answers for the user and check again.
    pub async fn refresh(&self, user_id: i64) -> AccessDecision {
        let Some(cache) = &self.cache else {
            return AccessDecision::Granted;
        };
        if let Err(e) = cache.invalidate(user_id).await {
            return self.on_error(user_id, e);
        }
        self.check(user_id).await
    }

    fn on_error(&self, user_id: i64, e: HabitualError) -> AccessDecision {
        if matches!(e, HabitualError::Invariant(_)) {
            error!("membership check for {user_id}: {e}");
        } else {
            warn!("membership check for {user_id}: {e}");
        }
        if self.fail_open {
            AccessDecision::Granted
        } else {
            AccessDecision::Unavailable
        }
    }

    /// Join links for channels addressed by `@username`.
    pub fn join_links(&self) -> Vec<String> {
        self.required
            .iter()
            .filter_map(|c| c.strip_prefix('@'))
            .map(|name| format!("https://t.me/{name}"))
            .collect()
    }

    /// User-facing explanation for a refusal.
    pub fn denial_text(&self, decision: &AccessDecision) -> String {
        match decision {
            AccessDecision::Granted => String::new(),
            AccessDecision::NotMember => {
                let mut out =
                    "You need to join the required channel(s) to use this bot.".to_string();
                for link in self.join_links() {
                    out.push_str(&format!("\n{link}"));
                }
                out.push_str("\n\nAlready joined? Send /refresh_membership.");
                out
            }
            AccessDecision::Unavailable => {
                "Could not verify your channel membership right now. Please try again later."
                    .to_string()
            }
        }
    }
}
