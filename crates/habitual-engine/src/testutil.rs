//! Shared fixtures for engine tests.

use chrono::{DateTime, Utc};
use habitual_core::config::MemoryConfig;
use habitual_memory::Store;
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fresh on-disk store in a unique temp directory.
pub async fn test_store() -> Store {
    let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "__habitual_engine_test_{}_{}__",
        std::process::id(),
        id
    ));
    let _ = std::fs::remove_dir_all(&dir);
    let db_path = dir.join("test.db").to_string_lossy().to_string();
    Store::new(&MemoryConfig { db_path }).await.unwrap()
}

pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}
