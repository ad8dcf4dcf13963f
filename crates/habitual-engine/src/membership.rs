//! Membership verification cache.
//!
//! Answers from the membership authority are kept in the store for a TTL.
//! Concurrent lookups for the same (user, channel) share one in-flight
//! future, so an expired entry causes exactly one authority call no matter
//! how many requests are waiting on it.

use chrono::TimeDelta;
use futures::future::{BoxFuture, FutureExt, Shared};
use habitual_core::{
    config::MembershipConfig,
    error::HabitualError,
    model::MembershipEntry,
    traits::{Clock, MembershipAuthority},
};
use habitual_memory::Store;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

type Lookup = Shared<BoxFuture<'static, Result<bool, HabitualError>>>;
type Key = (i64, String);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    store: Store,
    authority: Arc<dyn MembershipAuthority>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
    timeout: Duration,
    /// In-flight lookups, tagged with an id so only their creator removes them.
    inflight: Mutex<HashMap<Key, (u64, Lookup)>>,
    /// Bumped by `invalidate`. A lookup that started under an older epoch
    /// must not write its answer back.
    epochs: Mutex<HashMap<i64, u64>>,
    /// Serializes cache write-back against invalidation.
    write_gate: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

impl Inner {
    fn epoch(&self, user_id: i64) -> u64 {
        lock(&self.epochs).get(&user_id).copied().unwrap_or(0)
    }

    async fn lookup(&self, user_id: i64, channel_id: &str) -> Result<bool, HabitualError> {
        let epoch = self.epoch(user_id);
        let now = self.clock.now();

        if let Some(entry) = self.store.get_membership(user_id, channel_id).await? {
            let age = now - entry.checked_at;
            if age < TimeDelta::zero() {
                error!(
                    user_id,
                    channel_id,
                    checked_at = %entry.checked_at,
                    %now,
                    "membership cache entry has negative age"
                );
                return Err(HabitualError::Invariant(format!(
                    "membership entry for {user_id}/{channel_id} checked in the future ({})",
                    entry.checked_at
                )));
            }
            if age < self.ttl {
                return Ok(entry.is_member);
            }
        }

        let answer = match tokio::time::timeout(
            self.timeout,
            self.authority.check_membership(user_id, channel_id),
        )
        .await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!("membership check failed for {user_id} in {channel_id}: {e}");
                return Err(HabitualError::Transient(format!(
                    "membership check for {channel_id} failed: {e}"
                )));
            }
            Err(_) => {
                warn!(
                    "membership check for {user_id} in {channel_id} timed out after {:?}",
                    self.timeout
                );
                return Err(HabitualError::Transient(format!(
                    "membership check for {channel_id} timed out"
                )));
            }
        };

        let _gate = self.write_gate.lock().await;
        if self.epoch(user_id) != epoch {
            debug!("membership of {user_id} invalidated during lookup, not caching");
            return Ok(answer);
        }
        self.store
            .put_membership(&MembershipEntry {
                user_id,
                channel_id: channel_id.to_string(),
                is_member: answer,
                checked_at: self.clock.now(),
            })
            .await?;
        debug!("membership of {user_id} in {channel_id} refreshed: {answer}");
        Ok(answer)
    }
}

/// TTL cache in front of a [`MembershipAuthority`].
#[derive(Clone)]
pub struct MembershipCache {
    inner: Arc<Inner>,
}

impl MembershipCache {
    pub fn new(
        store: Store,
        authority: Arc<dyn MembershipAuthority>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                authority,
                clock,
                ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
                timeout,
                inflight: Mutex::new(HashMap::new()),
                epochs: Mutex::new(HashMap::new()),
                write_gate: tokio::sync::Mutex::new(()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn from_config(
        store: Store,
        authority: Arc<dyn MembershipAuthority>,
        clock: Arc<dyn Clock>,
        config: &MembershipConfig,
    ) -> Self {
        Self::new(store, authority, clock, config.ttl(), config.timeout())
    }

    /// Whether `user_id` belongs to `channel_id`.
    ///
    /// Served from the cache while fresh. Authority failures surface as
    /// [`HabitualError::Transient`] and leave the cached entry untouched.
    pub async fn is_member(&self, user_id: i64, channel_id: &str) -> Result<bool, HabitualError> {
        let key: Key = (user_id, channel_id.to_string());

        let (id, lookup) = {
            let mut inflight = lock(&self.inner.inflight);
            match inflight.get(&key) {
                Some((id, lookup)) => (*id, lookup.clone()),
                None => {
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    let inner = self.inner.clone();
                    let channel = channel_id.to_string();
                    let lookup = async move { inner.lookup(user_id, &channel).await }
                        .boxed()
                        .shared();
                    inflight.insert(key.clone(), (id, lookup.clone()));
                    (id, lookup)
                }
            }
        };

        let result = lookup.await;

        let mut inflight = lock(&self.inner.inflight);
        if inflight.get(&key).is_some_and(|(current, _)| *current == id) {
            inflight.remove(&key);
        }
        result
    }

    /// Whether `user_id` belongs to every channel. Stops at the first `false`.
    pub async fn is_member_of_all(
        &self,
        user_id: i64,
        channels: &[String],
    ) -> Result<bool, HabitualError> {
        for channel in channels {
            if !self.is_member(user_id, channel).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Forget everything cached for `user_id`. The next lookup always
    /// reaches the authority. Returns the number of stored entries dropped.
    pub async fn invalidate(&self, user_id: i64) -> Result<u64, HabitualError> {
        let _gate = self.inner.write_gate.lock().await;
        *lock(&self.inner.epochs).entry(user_id).or_insert(0) += 1;
        lock(&self.inner.inflight).retain(|(user, _), _| *user != user_id);
        let removed = self.inner.store.delete_memberships_for_user(user_id).await?;
        info!("membership cache invalidated for {user_id} ({removed} entries)");
        Ok(removed)
    }
}
