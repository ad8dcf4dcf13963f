//! Serde default-value functions.

pub(super) fn default_true() -> bool {
    true
}
pub(super) fn default_name() -> String {
    "Habitual".to_string()
}
pub(super) fn default_data_dir() -> String {
    "~/.habitual".to_string()
}
pub(super) fn default_log_level() -> String {
    "info".to_string()
}
pub(super) fn default_timezone() -> String {
    "UTC".to_string()
}
pub(super) fn default_stats_window_days() -> u32 {
    30
}
pub(super) fn default_db_path() -> String {
    "~/.habitual/data/habitual.db".to_string()
}
pub(super) fn default_reconcile_interval() -> u64 {
    3600
}
pub(super) fn default_delivery_workers() -> usize {
    4
}
pub(super) fn default_delivery_timeout() -> u64 {
    15
}
pub(super) fn default_message_template() -> String {
    "Reminder: time for \"{habit}\"!".to_string()
}
pub(super) fn default_cache_ttl() -> u64 {
    300
}
pub(super) fn default_membership_timeout() -> u64 {
    10
}
