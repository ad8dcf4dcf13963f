//! Reminder scheduler.
//!
//! The armed timers are a projection of the enabled reminder rows in the
//! store and can be rebuilt from it at any time with [`Scheduler::reconcile`].
//! Each armed reminder owns one tokio task that sleeps on the injected
//! [`Clock`] until its fire instant. Instants are never persisted; they are
//! recomputed from the wall-clock time of day every time a timer is armed.
//!
//! Per habit, `upsert`, `remove` and the firing path are serialized by an
//! async lock. Every armed timer carries a generation number that must still
//! own the habit's slot when it fires.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use habitual_core::{
    clock::{local_date, next_fire_after},
    config::SchedulerConfig,
    error::HabitualError,
    model::Reminder,
    traits::{Clock, DeliverySink},
};
use habitual_memory::Store;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Timers newly armed or re-armed for a changed time of day.
    pub armed: usize,
    /// Timers already correct, left untouched.
    pub kept: usize,
    /// Timers whose reminder is gone or disabled.
    pub cancelled: usize,
    /// Habits left alone because a fire or an edit held their lock.
    pub skipped_busy: usize,
}

/// One armed timer.
struct Slot {
    generation: u64,
    at: NaiveTime,
    fire_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

/// Per-habit serialization point.
#[derive(Default)]
struct HabitGate {
    lock: tokio::sync::Mutex<()>,
    /// Generation of the last explicit upsert/remove. Reconcile leaves a
    /// habit alone if it was touched after the snapshot was taken.
    touched: AtomicU64,
}

struct Inner {
    store: Store,
    sink: Arc<dyn DeliverySink>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    config: SchedulerConfig,
    slots: Mutex<HashMap<String, Slot>>,
    gates: Mutex<HashMap<String, Arc<HabitGate>>>,
    workers: Arc<Semaphore>,
    generation: AtomicU64,
    stopped: AtomicBool,
    reconcile_task: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn gate(&self, habit_id: &str) -> Arc<HabitGate> {
        lock(&self.gates)
            .entry(habit_id.to_string())
            .or_default()
            .clone()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn cancel(&self, habit_id: &str) -> bool {
        match lock(&self.slots).remove(habit_id) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Replace the habit's timer with one firing at the first `at` strictly
    /// after `after`. Callers hold the habit's gate.
    fn arm(
        self: &Arc<Self>,
        habit_id: &str,
        at: NaiveTime,
        after: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.cancel(habit_id);
        if self.stopped.load(Ordering::SeqCst) || !self.config.enabled {
            return None;
        }

        let fire_at = next_fire_after(after, self.tz, at);
        let generation = self.next_generation();
        let inner = Arc::clone(self);
        let id = habit_id.to_string();
        let handle = tokio::spawn(async move {
            inner.clock.sleep_until(fire_at).await;
            match inner.on_fire(&id, generation).await {
                Ok(()) => {}
                Err(e @ HabitualError::Invariant(_)) => error!("reminder {id}: {e}"),
                Err(e) => warn!("reminder {id}: {e}"),
            }
        });

        lock(&self.slots).insert(
            habit_id.to_string(),
            Slot {
                generation,
                at,
                fire_at,
                handle,
            },
        );
        debug!("reminder {habit_id} armed for {fire_at} (generation {generation})");
        Some(fire_at)
    }

    async fn on_fire(
        self: &Arc<Self>,
        habit_id: &str,
        generation: u64,
    ) -> Result<(), HabitualError> {
        let gate = self.gate(habit_id);
        let _guard = gate.lock.lock().await;

        // Detach our own slot so re-arming below does not abort this task.
        let (at, fire_at) = {
            let mut slots = lock(&self.slots);
            let owner = slots.get(habit_id).map(|s| s.generation);
            if owner != Some(generation) {
                error!(
                    habit_id,
                    generation,
                    slot_generation = ?owner,
                    "cancelled reminder timer fired"
                );
                return Err(HabitualError::Invariant(format!(
                    "timer generation {generation} for habit {habit_id} fired but slot is owned by {owner:?}"
                )));
            }
            match slots.remove(habit_id) {
                Some(slot) => (slot.at, slot.fire_at),
                None => return Ok(()),
            }
        };

        let reminder = match self.store.get_reminder(habit_id).await {
            Ok(Some(r)) if r.enabled => r,
            Ok(_) => {
                debug!("reminder {habit_id} gone or disabled, dropping fire");
                return Ok(());
            }
            Err(e) => {
                // Keep the reminder alive; the next tick reads the store again.
                self.arm(habit_id, at, fire_at.max(self.clock.now()));
                return Err(e);
            }
        };
        let habit = match self.store.get_habit(habit_id).await {
            Ok(Some(h)) => h,
            Ok(None) => {
                debug!("habit {habit_id} deleted, dropping fire");
                return Ok(());
            }
            Err(e) => {
                self.arm(habit_id, at, fire_at.max(self.clock.now()));
                return Err(e);
            }
        };

        let at = reminder.time_of_day().unwrap_or(at);
        let fire_date = local_date(fire_at, self.tz);

        if reminder.last_fired_on == Some(fire_date) {
            info!("reminder {habit_id} already fired on {fire_date}, skipping delivery");
        } else {
            let error = self.deliver(&reminder, &habit.name).await;
            if let Err(e) = self
                .store
                .mark_reminder_fired(habit_id, fire_date, error.as_deref())
                .await
            {
                warn!("reminder {habit_id}: could not record fire: {e}");
            }
        }

        // Always re-arm, whatever happened to the delivery.
        if let Some(next) = self.arm(habit_id, at, fire_at.max(self.clock.now())) {
            debug!("reminder {habit_id} next fire at {next}");
        }
        Ok(())
    }

    /// Call the sink once. Returns the failure text, if any.
    async fn deliver(&self, reminder: &Reminder, habit_name: &str) -> Option<String> {
        let text = self.config.render(habit_name);
        let _permit = match self.workers.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return Some("delivery pool closed".to_string()),
        };

        let outcome = tokio::time::timeout(
            self.config.delivery_timeout(),
            self.sink.notify(reminder.owner_id, &reminder.habit_id, &text),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                info!(
                    "reminder delivered to {} for habit {}",
                    reminder.owner_id, reminder.habit_id
                );
                None
            }
            Ok(Err(e)) => {
                warn!(
                    "reminder delivery to {} for habit {} failed: {e}",
                    reminder.owner_id, reminder.habit_id
                );
                Some(e.to_string())
            }
            Err(_) => {
                warn!(
                    "reminder delivery to {} for habit {} timed out",
                    reminder.owner_id, reminder.habit_id
                );
                Some("delivery timed out".to_string())
            }
        }
    }
}

/// Owns every armed reminder timer.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        store: Store,
        sink: Arc<dyn DeliverySink>,
        clock: Arc<dyn Clock>,
        tz: Tz,
        config: SchedulerConfig,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.delivery_workers.max(1)));
        Self {
            inner: Arc::new(Inner {
                store,
                sink,
                clock,
                tz,
                config,
                slots: Mutex::new(HashMap::new()),
                gates: Mutex::new(HashMap::new()),
                workers,
                generation: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
                reconcile_task: Mutex::new(None),
            }),
        }
    }

    /// Rehydrate from the store, then keep reconciling in the background.
    pub async fn start(&self) -> Result<ReconcileReport, HabitualError> {
        let report = self.reconcile().await?;
        info!(
            "scheduler started: {} armed, {} kept, {} cancelled",
            report.armed, report.kept, report.cancelled
        );

        let scheduler = self.clone();
        let interval = std::time::Duration::from_secs(self.inner.config.reconcile_interval_secs);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match scheduler.reconcile().await {
                    Ok(r) if r.armed + r.cancelled > 0 => {
                        info!(
                            "scheduler reconciled: {} armed, {} cancelled, {} busy",
                            r.armed, r.cancelled, r.skipped_busy
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!("scheduler reconcile failed: {e}"),
                }
            }
        });
        if let Some(old) = lock(&self.inner.reconcile_task).replace(handle) {
            old.abort();
        }
        Ok(report)
    }

    /// Make the armed timers match the enabled reminders in the store.
    pub async fn reconcile(&self) -> Result<ReconcileReport, HabitualError> {
        // Anything armed or touched after this point is newer than the snapshot.
        let floor = self.inner.generation.load(Ordering::SeqCst);
        let reminders = self.inner.store.enabled_reminders().await?;
        let now = self.inner.clock.now();
        let mut report = ReconcileReport::default();

        let mut wanted: HashMap<String, NaiveTime> = HashMap::new();
        for reminder in &reminders {
            match reminder.time_of_day() {
                Ok(at) => {
                    wanted.insert(reminder.habit_id.clone(), at);
                }
                Err(e) => warn!("skipping reminder: {e}"),
            }
        }

        for (habit_id, at) in &wanted {
            let gate = self.inner.gate(habit_id);
            let Ok(_guard) = gate.lock.try_lock() else {
                report.skipped_busy += 1;
                continue;
            };
            let current = lock(&self.inner.slots)
                .get(habit_id)
                .map(|s| (s.at, s.generation));
            let touched = gate.touched.load(Ordering::SeqCst);
            match current {
                Some((slot_at, _)) if slot_at == *at => report.kept += 1,
                Some((_, g)) if g > floor => report.kept += 1,
                _ if touched > floor => report.kept += 1,
                _ => {
                    if self.inner.arm(habit_id, *at, now).is_some() {
                        report.armed += 1;
                    }
                }
            }
        }

        let stale: Vec<(String, u64)> = lock(&self.inner.slots)
            .iter()
            .filter(|(id, _)| !wanted.contains_key(*id))
            .map(|(id, slot)| (id.clone(), slot.generation))
            .collect();
        for (habit_id, generation) in stale {
            if generation > floor {
                continue;
            }
            let gate = self.inner.gate(&habit_id);
            let Ok(_guard) = gate.lock.try_lock() else {
                report.skipped_busy += 1;
                continue;
            };
            if gate.touched.load(Ordering::SeqCst) > floor {
                continue;
            }
            if self.inner.cancel(&habit_id) {
                debug!("reminder {habit_id} no longer enabled, timer cancelled");
                report.cancelled += 1;
            }
        }

        Ok(report)
    }

    /// Arm (or re-arm) the timer for a reminder. A disabled reminder is
    /// removed. Returns the next fire instant, if armed.
    pub async fn upsert(
        &self,
        reminder: &Reminder,
    ) -> Result<Option<DateTime<Utc>>, HabitualError> {
        if !reminder.enabled {
            self.remove(&reminder.habit_id).await;
            return Ok(None);
        }
        let at = reminder.time_of_day()?;

        let gate = self.inner.gate(&reminder.habit_id);
        let _guard = gate.lock.lock().await;
        gate.touched
            .store(self.inner.next_generation(), Ordering::SeqCst);
        let fire_at = self
            .inner
            .arm(&reminder.habit_id, at, self.inner.clock.now());
        if let Some(t) = fire_at {
            info!(
                "reminder {} set for {:02}:{:02}, next fire {t}",
                reminder.habit_id, reminder.hour, reminder.minute
            );
        }
        Ok(fire_at)
    }

    /// Cancel the habit's timer. Returns `true` if one was armed.
    pub async fn remove(&self, habit_id: &str) -> bool {
        let gate = self.inner.gate(habit_id);
        let _guard = gate.lock.lock().await;
        gate.touched
            .store(self.inner.next_generation(), Ordering::SeqCst);
        let cancelled = self.inner.cancel(habit_id);
        if cancelled {
            info!("reminder {habit_id} timer cancelled");
        }
        cancelled
    }

    /// Next fire instant of a habit's armed timer.
    pub fn next_fire(&self, habit_id: &str) -> Option<DateTime<Utc>> {
        lock(&self.inner.slots).get(habit_id).map(|s| s.fire_at)
    }

    /// Number of armed timers.
    pub fn armed_count(&self) -> usize {
        lock(&self.inner.slots).len()
    }

    /// Cancel every timer and the background reconcile loop.
    pub fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        if let Some(task) = lock(&self.inner.reconcile_task).take() {
            task.abort();
        }
        let slots: Vec<Slot> = lock(&self.inner.slots).drain().map(|(_, s)| s).collect();
        let count = slots.len();
        for slot in slots {
            slot.handle.abort();
        }
        info!("scheduler stopped, {count} timers cancelled");
    }
}
