use super::{HabitField, Store};
use chrono::{NaiveDate, TimeZone, Utc};
use habitual_core::config::MemoryConfig;
use habitual_core::error::HabitualError;
use habitual_core::model::{CompletionOutcome, CompletionStatus, DayStatus, MembershipEntry};
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Create a temporary on-disk store for testing (unique per call).
async fn test_store() -> Store {
    let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "__habitual_store_test_{}_{}__",
        std::process::id(),
        id
    ));
    let _ = std::fs::remove_dir_all(&dir);
    let db_path = dir.join("test.db").to_string_lossy().to_string();
    Store::new(&MemoryConfig { db_path }).await.unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let store = test_store().await;
    Store::run_migrations(store.pool()).await.unwrap();
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 3);
    assert!(store.db_size().await.unwrap() > 0);
}

#[tokio::test]
async fn test_create_and_list_habits() {
    let store = test_store().await;
    let a = store
        .create_habit(1, "  Read ", Some("20 pages"), Some("mind"))
        .await
        .unwrap();
    let b = store.create_habit(1, "Run", None, None).await.unwrap();
    store.create_habit(2, "Swim", None, None).await.unwrap();

    assert_eq!(a.name, "Read");
    let habits = store.list_habits(1).await.unwrap();
    assert_eq!(habits.len(), 2);
    assert_eq!(habits[0].id, a.id);
    assert_eq!(habits[0].description.as_deref(), Some("20 pages"));
    assert_eq!(habits[1].id, b.id);

    let fetched = store.get_habit(&a.id).await.unwrap().unwrap();
    assert_eq!(fetched, habits[0]);
}

#[tokio::test]
async fn test_create_habit_rejects_blank_name() {
    let store = test_store().await;
    let err = store.create_habit(1, "   ", None, None).await.unwrap_err();
    assert!(matches!(err, HabitualError::InvalidInput(_)));
}

#[tokio::test]
async fn test_resolve_habit_by_name_and_prefix() {
    let store = test_store().await;
    let habit = store.create_habit(1, "Meditate", None, None).await.unwrap();

    let by_name = store.resolve_habit(1, "meditate").await.unwrap().unwrap();
    assert_eq!(by_name.id, habit.id);

    let by_prefix = store
        .resolve_habit(1, habit.short_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_prefix.id, habit.id);

    // Other owners cannot resolve it.
    assert!(store.resolve_habit(2, "Meditate").await.unwrap().is_none());
    assert!(store.resolve_habit(1, "nothing").await.unwrap().is_none());
    assert!(store.resolve_habit(1, "").await.unwrap().is_none());
}

#[tokio::test]
async fn test_resolve_habit_ambiguous_prefix() {
    let store = test_store().await;
    store.create_habit(1, "A", None, None).await.unwrap();
    store.create_habit(1, "B", None, None).await.unwrap();
    // Every id matches the empty-after-sanitizing prefix "%".
    let err = store.resolve_habit(1, "%").await.unwrap_err();
    assert!(matches!(err, HabitualError::InvalidInput(_)));
}

#[tokio::test]
async fn test_update_habit_fields() {
    let store = test_store().await;
    let habit = store
        .create_habit(1, "Read", Some("old"), None)
        .await
        .unwrap();

    assert!(store
        .update_habit(&habit.id, 1, HabitField::Name, Some("Read more"))
        .await
        .unwrap());
    assert!(store
        .update_habit(&habit.id, 1, HabitField::Description, None)
        .await
        .unwrap());
    // Wrong owner: nothing changes.
    assert!(!store
        .update_habit(&habit.id, 2, HabitField::Category, Some("x"))
        .await
        .unwrap());
    assert!(store
        .update_habit(&habit.id, 1, HabitField::Name, Some("  "))
        .await
        .is_err());

    let updated = store.get_habit(&habit.id).await.unwrap().unwrap();
    assert_eq!(updated.name, "Read more");
    assert!(updated.description.is_none());
    assert!(updated.category.is_none());
}

#[tokio::test]
async fn test_completion_upsert_semantics() {
    let store = test_store().await;
    let habit = store.create_habit(1, "Read", None, None).await.unwrap();

    assert_eq!(
        store.day_status(&habit.id, day(1)).await.unwrap(),
        DayStatus::Pending
    );

    let first = store
        .record_completion(&habit.id, day(1), CompletionStatus::Skipped)
        .await
        .unwrap();
    assert_eq!(first, CompletionOutcome::Recorded);

    let again = store
        .record_completion(&habit.id, day(1), CompletionStatus::Skipped)
        .await
        .unwrap();
    assert_eq!(again, CompletionOutcome::Unchanged);

    let overwrite = store
        .record_completion(&habit.id, day(1), CompletionStatus::Done)
        .await
        .unwrap();
    assert_eq!(overwrite, CompletionOutcome::Recorded);
    assert_eq!(
        store.day_status(&habit.id, day(1)).await.unwrap(),
        DayStatus::Done
    );

    // Still exactly one record for the date.
    assert_eq!(store.history_count(1, Some(&habit.id)).await.unwrap(), 1);

    assert!(store.clear_completion(&habit.id, day(1)).await.unwrap());
    assert!(!store.clear_completion(&habit.id, day(1)).await.unwrap());
    assert_eq!(
        store.day_status(&habit.id, day(1)).await.unwrap(),
        DayStatus::Pending
    );
}

#[tokio::test]
async fn test_record_completion_unknown_habit() {
    let store = test_store().await;
    let err = store
        .record_completion("no-such-habit", day(1), CompletionStatus::Done)
        .await
        .unwrap_err();
    assert!(matches!(err, HabitualError::NotFound(_)));
}

#[tokio::test]
async fn test_completions_between_is_inclusive() {
    let store = test_store().await;
    let habit = store.create_habit(1, "Read", None, None).await.unwrap();
    for d in [1, 2, 5, 9] {
        store
            .record_completion(&habit.id, day(d), CompletionStatus::Done)
            .await
            .unwrap();
    }
    store
        .record_completion(&habit.id, day(3), CompletionStatus::Skipped)
        .await
        .unwrap();

    let log = store
        .completions_between(&habit.id, day(2), day(5))
        .await
        .unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log.get(&day(2)), Some(&CompletionStatus::Done));
    assert_eq!(log.get(&day(3)), Some(&CompletionStatus::Skipped));
    assert_eq!(log.get(&day(5)), Some(&CompletionStatus::Done));
    assert!(!log.contains_key(&day(1)));
}

#[tokio::test]
async fn test_statuses_on_and_history() {
    let store = test_store().await;
    let read = store.create_habit(1, "Read", None, None).await.unwrap();
    let run = store.create_habit(1, "Run", None, None).await.unwrap();
    store
        .record_completion(&read.id, day(4), CompletionStatus::Done)
        .await
        .unwrap();
    store
        .record_completion(&run.id, day(3), CompletionStatus::Skipped)
        .await
        .unwrap();

    let today = store.statuses_on(1, day(4)).await.unwrap();
    assert_eq!(today.len(), 2);
    assert_eq!(today[0].0.id, read.id);
    assert_eq!(today[0].1, DayStatus::Done);
    assert_eq!(today[1].1, DayStatus::Pending);

    let history = store.history(1, None, 10, 0).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].date, day(4));
    assert_eq!(history[0].habit_name, "Read");
    assert_eq!(history[1].status, CompletionStatus::Skipped);

    let page = store.history(1, None, 1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].habit_id, run.id);

    let only_run = store.history(1, Some(&run.id), 10, 0).await.unwrap();
    assert_eq!(only_run.len(), 1);
    assert_eq!(store.history_count(1, None).await.unwrap(), 2);
    assert_eq!(store.history_count(2, None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_reminder_set_overwrites() {
    let store = test_store().await;
    let habit = store.create_habit(7, "Read", None, None).await.unwrap();

    let r = store.set_reminder(&habit.id, 8, 15).await.unwrap();
    assert_eq!((r.hour, r.minute, r.owner_id), (8, 15, 7));
    assert!(r.enabled);

    store.set_reminder_enabled(&habit.id, false).await.unwrap();
    let r = store.set_reminder(&habit.id, 21, 0).await.unwrap();
    assert_eq!((r.hour, r.minute), (21, 0));
    assert!(r.enabled, "re-setting a reminder enables it");

    assert_eq!(store.reminders_for_owner(7).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reminder_rejects_bad_time_and_unknown_habit() {
    let store = test_store().await;
    let habit = store.create_habit(1, "Read", None, None).await.unwrap();
    assert!(matches!(
        store.set_reminder(&habit.id, 24, 0).await,
        Err(HabitualError::InvalidInput(_))
    ));
    assert!(matches!(
        store.set_reminder("missing", 8, 0).await,
        Err(HabitualError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_enabled_reminders_snapshot() {
    let store = test_store().await;
    let a = store.create_habit(1, "A", None, None).await.unwrap();
    let b = store.create_habit(1, "B", None, None).await.unwrap();
    store.set_reminder(&a.id, 9, 0).await.unwrap();
    store.set_reminder(&b.id, 7, 0).await.unwrap();
    store.set_reminder_enabled(&a.id, false).await.unwrap();

    let enabled = store.enabled_reminders().await.unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].habit_id, b.id);
}

#[tokio::test]
async fn test_fired_marker_roundtrip() {
    let store = test_store().await;
    let habit = store.create_habit(1, "A", None, None).await.unwrap();
    store.set_reminder(&habit.id, 9, 0).await.unwrap();

    store
        .mark_reminder_fired(&habit.id, day(2), Some("blocked by user"))
        .await
        .unwrap();
    let r = store.get_reminder(&habit.id).await.unwrap().unwrap();
    assert_eq!(r.last_fired_on, Some(day(2)));
    assert_eq!(r.last_error.as_deref(), Some("blocked by user"));

    store
        .mark_reminder_fired(&habit.id, day(3), None)
        .await
        .unwrap();
    let r = store.get_reminder(&habit.id).await.unwrap().unwrap();
    assert_eq!(r.last_fired_on, Some(day(3)));
    assert!(r.last_error.is_none());
}

#[tokio::test]
async fn test_new_reminder_time_clears_fired_marker() {
    let store = test_store().await;
    let habit = store.create_habit(1, "A", None, None).await.unwrap();
    store.set_reminder(&habit.id, 9, 0).await.unwrap();
    store
        .mark_reminder_fired(&habit.id, day(2), None)
        .await
        .unwrap();

    // Same time again: today's delivery still counts.
    let r = store.set_reminder(&habit.id, 9, 0).await.unwrap();
    assert_eq!(r.last_fired_on, Some(day(2)));

    let r = store.set_reminder(&habit.id, 21, 0).await.unwrap();
    assert_eq!(r.last_fired_on, None);
}

#[tokio::test]
async fn test_delete_habit_cascades() {
    let store = test_store().await;
    let habit = store.create_habit(1, "Read", None, None).await.unwrap();
    store
        .record_completion(&habit.id, day(1), CompletionStatus::Done)
        .await
        .unwrap();
    store.set_reminder(&habit.id, 9, 0).await.unwrap();

    assert!(!store.delete_habit(&habit.id, 2).await.unwrap());
    assert!(store.delete_habit(&habit.id, 1).await.unwrap());

    assert!(store.get_habit(&habit.id).await.unwrap().is_none());
    assert!(store.get_reminder(&habit.id).await.unwrap().is_none());
    assert_eq!(store.history_count(1, None).await.unwrap(), 0);
    assert!(store.enabled_reminders().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_membership_cache_rows() {
    let store = test_store().await;
    let checked_at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
    let entry = MembershipEntry {
        user_id: 5,
        channel_id: "@club".to_string(),
        is_member: true,
        checked_at,
    };
    store.put_membership(&entry).await.unwrap();
    store
        .put_membership(&MembershipEntry {
            channel_id: "@other".to_string(),
            ..entry.clone()
        })
        .await
        .unwrap();

    assert_eq!(
        store.get_membership(5, "@club").await.unwrap(),
        Some(entry.clone())
    );

    store
        .put_membership(&MembershipEntry {
            is_member: false,
            ..entry.clone()
        })
        .await
        .unwrap();
    assert!(!store.get_membership(5, "@club").await.unwrap().unwrap().is_member);

    assert_eq!(store.delete_memberships_for_user(5).await.unwrap(), 2);
    assert!(store.get_membership(5, "@club").await.unwrap().is_none());
}
