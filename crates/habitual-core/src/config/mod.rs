mod channels;
mod defaults;

#[cfg(test)]
mod tests;

pub use channels::*;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::HabitualError;
use defaults::*;

/// Environment variable that fills in an empty `channel.telegram.bot_token`.
pub const BOT_TOKEN_ENV: &str = "HABITUAL_BOT_TOKEN";

/// Top-level Habitual configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub habitual: HabitualConfig,
    #[serde(default)]
    pub habits: HabitsConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub membership: MembershipConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
}

/// General bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitualConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for HabitualConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Habit tracking settings shared by the scheduler and the statistics engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitsConfig {
    /// IANA zone name. Calendar dates and reminder times are interpreted here.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Look-back window for statistics, in calendar days.
    #[serde(default = "default_stats_window_days")]
    pub stats_window_days: u32,
}

impl Default for HabitsConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            stats_window_days: default_stats_window_days(),
        }
    }
}

impl HabitsConfig {
    /// Parse the configured zone.
    pub fn tz(&self) -> Result<Tz, HabitualError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| HabitualError::Config(format!("invalid timezone '{}': {e}", self.timezone)))
    }
}

/// Storage config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Reminder scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How often the timer set is re-derived from the store.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    /// Maximum concurrent delivery calls.
    #[serde(default = "default_delivery_workers")]
    pub delivery_workers: usize,
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,
    /// Reminder text. `{habit}` is replaced with the habit name.
    #[serde(default = "default_message_template")]
    pub message_template: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reconcile_interval_secs: default_reconcile_interval(),
            delivery_workers: default_delivery_workers(),
            delivery_timeout_secs: default_delivery_timeout(),
            message_template: default_message_template(),
        }
    }
}

impl SchedulerConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    /// Render the reminder text for a habit.
    pub fn render(&self, habit_name: &str) -> String {
        self.message_template.replace("{habit}", habit_name)
    }
}

/// Channel membership gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipConfig {
    /// Channels a user must belong to (`@username` or numeric id). Empty = gate disabled.
    #[serde(default)]
    pub required_channels: Vec<String>,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Bound on a single authority call.
    #[serde(default = "default_membership_timeout")]
    pub timeout_secs: u64,
    /// Allow access when the authority cannot be reached.
    #[serde(default)]
    pub fail_open: bool,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            required_channels: Vec::new(),
            cache_ttl_secs: default_cache_ttl(),
            timeout_secs: default_membership_timeout(),
            fail_open: false,
        }
    }
}

impl MembershipConfig {
    pub fn is_enabled(&self) -> bool {
        !self.required_channels.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Reject values that would only fail later at runtime.
    pub fn validate(&self) -> Result<(), HabitualError> {
        self.habits.tz()?;
        if self.habits.stats_window_days == 0 {
            return Err(HabitualError::Config(
                "habits.stats_window_days must be at least 1".to_string(),
            ));
        }
        if self.scheduler.delivery_workers == 0 {
            return Err(HabitualError::Config(
                "scheduler.delivery_workers must be at least 1".to_string(),
            ));
        }
        if self.scheduler.reconcile_interval_secs == 0 {
            return Err(HabitualError::Config(
                "scheduler.reconcile_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, HabitualError> {
    let path = Path::new(path);
    let mut config = if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        Config::default()
    } else {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HabitualError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        parse(&content)?
    };

    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Parse configuration from TOML text without touching the environment.
pub fn parse(content: &str) -> Result<Config, HabitualError> {
    toml::from_str(content)
        .map_err(|e| HabitualError::Config(format!("failed to parse config: {}", e)))
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
        if token.is_empty() {
            return;
        }
        let tg = config.channel.telegram.get_or_insert_with(TelegramConfig::default);
        if tg.bot_token.is_empty() {
            tg.bot_token = token;
        }
    }
}
