use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Registrations below this size are never pruned automatically.
const MIN_PRUNE_LEN: usize = 64;

/// Allocates identity tokens for shared objects.
///
/// The same `Arc` allocation always receives the same token while it is
/// alive, and distinct allocations receive distinct tokens even if their
/// contents compare equal. Tokens are assigned monotonically, starting at 1,
/// on first sight.
///
/// The registry keeps a [`Weak`] to each registered allocation, so an
/// address cannot be handed out to a new allocation while it is still
/// registered. Once every strong reference is gone the registration is dead
/// and is replaced by a fresh token should the address come back.
pub struct IdentityRegistry {
    inner: Mutex<Inner>,
    next: AtomicU64,
}

struct Inner {
    /// Maps from allocation addresses to registrations.
    map: FxHashMap<usize, Registration>,
    /// The size at which the next automatic pruning happens.
    prune_at: usize,
}

struct Registration {
    token: u64,
    target: Weak<dyn Any + Send + Sync>,
}

impl IdentityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { map: FxHashMap::default(), prune_at: MIN_PRUNE_LEN }),
            next: AtomicU64::new(1),
        }
    }

    /// Return the identity token of a shared object.
    pub fn token<T>(&self, object: &Arc<T>) -> u64
    where
        T: Any + Send + Sync,
    {
        let address = Arc::as_ptr(object) as *const () as usize;
        let mut inner = self.inner.lock();

        if let Some(registration) = inner.map.get(&address) {
            if registration.target.strong_count() > 0 {
                return registration.token;
            }
        }

        let token = self.next.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<T> = Arc::downgrade(object);
        let target: Weak<dyn Any + Send + Sync> = weak;
        inner.map.insert(address, Registration { token, target });

        if inner.map.len() >= inner.prune_at {
            inner.map.retain(|_, registration| registration.target.strong_count() > 0);
            inner.prune_at = (inner.map.len() * 2).max(MIN_PRUNE_LEN);
        }

        token
    }

    /// Drop the registrations of objects that are no longer alive.
    ///
    /// Returns how many registrations were dropped.
    pub fn prune(&self) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.map.len();
        inner.map.retain(|_, registration| registration.target.strong_count() > 0);
        before - inner.map.len()
    }

    /// The number of registered objects, including dead ones not yet pruned.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Whether no object is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
