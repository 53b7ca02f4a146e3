use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::deferred::Deferred;
use crate::error::ConfigError;
use crate::key::Key;

/// A concurrent key-value store backing a memoizer.
///
/// The store is the only shared mutable state of a memoizer. It must provide
/// an atomic insert-if-absent: of any number of racing inserts for the same
/// key, exactly one is stored and all others observe the stored value.
pub trait Store<V>: Send + Sync {
    /// Look up the live value for a key.
    fn get(&self, key: &Key) -> Option<V>;

    /// Insert a value unless a live value exists for the key.
    fn insert_if_absent(&self, key: Key, value: V) -> Inserted<V>;

    /// Remove the value for a key.
    fn remove(&self, key: &Key) -> Option<V>;

    /// A point-in-time snapshot of all live entries.
    fn entries(&self) -> Vec<(Key, V)>;

    /// The number of live entries.
    fn len(&self) -> usize;

    /// Whether the store holds no live entry.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all expired entries and return how many were dropped.
    fn purge_expired(&self) -> usize {
        0
    }
}

/// The result of [`Store::insert_if_absent`].
#[derive(Debug, Clone)]
pub enum Inserted<V> {
    /// The given value was stored.
    Stored,
    /// A live value already existed and is returned instead.
    Existing(V),
}

/// When entries of a [`MapStore`] expire.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EvictionPolicy {
    /// Entries live until they are removed.
    #[default]
    Forever,
    /// Entries expire once the duration has passed since insertion, or
    /// since the value settled if it reports [`Expiry::settled_at`].
    TimeToLive(Duration),
    /// Entries expire once the duration has passed since they were last
    /// looked up, inserted, or settled.
    Sliding(Duration),
}

impl EvictionPolicy {
    /// Check that the policy is consistent.
    pub fn validate(self) -> Result<Self, ConfigError> {
        match self {
            Self::TimeToLive(ttl) if ttl.is_zero() => Err(ConfigError::ZeroTimeToLive),
            Self::Sliding(window) if window.is_zero() => {
                Err(ConfigError::ZeroSlidingWindow)
            }
            _ => Ok(self),
        }
    }
}

/// Values that may be exempt from expiry.
pub trait Expiry {
    /// Whether the value must not expire at the moment.
    fn is_pinned(&self) -> bool {
        false
    }

    /// When the value reached its final state, if later than its insertion.
    ///
    /// Expiry is measured from the later of insertion and this instant.
    fn settled_at(&self) -> Option<Instant> {
        None
    }
}

/// A computation that is still running never expires, so it cannot be
/// started a second time under the same key. A finished one ages from its
/// completion.
impl<T> Expiry for Arc<Deferred<T>> {
    fn is_pinned(&self) -> bool {
        !self.is_ready()
    }

    fn settled_at(&self) -> Option<Instant> {
        self.completed_at()
    }
}

/// A hash map store with an optional eviction policy.
pub struct MapStore<V> {
    map: RwLock<FxHashMap<Key, Slot<V>>>,
    policy: EvictionPolicy,
    epoch: Instant,
}

/// A stored value.
struct Slot<V> {
    value: V,
    /// Nanoseconds since the store's epoch at which the slot was inserted or,
    /// for sliding expiration, last looked up.
    touched: AtomicU64,
}

impl<V> MapStore<V> {
    /// Create a store whose entries never expire.
    pub fn new() -> Self {
        Self::with_policy(EvictionPolicy::Forever)
    }

    /// Create a store with the given eviction policy.
    ///
    /// The policy is not validated here, see [`EvictionPolicy::validate`].
    pub fn with_policy(policy: EvictionPolicy) -> Self {
        Self { map: RwLock::new(FxHashMap::default()), policy, epoch: Instant::now() }
    }

    /// The store's eviction policy.
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    fn now(&self) -> u64 {
        self.since_epoch(Instant::now())
    }

    fn since_epoch(&self, instant: Instant) -> u64 {
        let nanos = instant.saturating_duration_since(self.epoch).as_nanos();
        u64::try_from(nanos).unwrap_or(u64::MAX)
    }
}

impl<V: Expiry> MapStore<V> {
    /// Whether a slot has expired at time `now`.
    fn expired(&self, slot: &Slot<V>, now: u64) -> bool {
        let limit = match self.policy {
            EvictionPolicy::Forever => return false,
            EvictionPolicy::TimeToLive(limit) | EvictionPolicy::Sliding(limit) => limit,
        };
        if slot.value.is_pinned() {
            return false;
        }
        let mut anchor = slot.touched.load(Ordering::Relaxed);
        if let Some(settled) = slot.value.settled_at() {
            anchor = anchor.max(self.since_epoch(settled));
        }
        let age = now.saturating_sub(anchor);
        u128::from(age) >= limit.as_nanos()
    }
}

impl<V> Store<V> for MapStore<V>
where
    V: Expiry + Clone + Send + Sync,
{
    fn get(&self, key: &Key) -> Option<V> {
        let map = self.map.read();
        let slot = map.get(key)?;
        let now = self.now();
        if self.expired(slot, now) {
            return None;
        }
        if let EvictionPolicy::Sliding(_) = self.policy {
            slot.touched.fetch_max(now, Ordering::Relaxed);
        }
        Some(slot.value.clone())
    }

    fn insert_if_absent(&self, key: Key, value: V) -> Inserted<V> {
        let mut map = self.map.write();
        let now = self.now();
        if let Some(slot) = map.get(&key) {
            if !self.expired(slot, now) {
                return Inserted::Existing(slot.value.clone());
            }
        }
        map.insert(key, Slot { value, touched: AtomicU64::new(now) });
        Inserted::Stored
    }

    fn remove(&self, key: &Key) -> Option<V> {
        self.map.write().remove(key).map(|slot| slot.value)
    }

    fn entries(&self) -> Vec<(Key, V)> {
        let map = self.map.read();
        let now = self.now();
        map.iter()
            .filter(|(_, slot)| !self.expired(slot, now))
            .map(|(key, slot)| (key.clone(), slot.value.clone()))
            .collect()
    }

    fn len(&self) -> usize {
        let map = self.map.read();
        let now = self.now();
        map.values().filter(|slot| !self.expired(slot, now)).count()
    }

    fn purge_expired(&self) -> usize {
        let mut map = self.map.write();
        let now = self.now();
        let before = map.len();
        map.retain(|_, slot| !self.expired(slot, now));
        before - map.len()
    }
}

impl<V> Default for MapStore<V> {
    fn default() -> Self {
        Self::new()
    }
}
