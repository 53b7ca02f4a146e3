use std::fmt::{self, Debug, Formatter};
use std::sync::OnceLock;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::error::MemoError;

/// The eventual result of a memoized computation.
///
/// A deferred value is assigned exactly once, by the caller that initiated
/// the computation. Any number of callers may wait for it concurrently.
/// Once assigned, reads do not take a lock.
pub struct Deferred<T> {
    outcome: OnceLock<Settled<T>>,
    /// Only taken by waiters while the value is pending.
    pending: Mutex<()>,
    ready: Condvar,
}

struct Settled<T> {
    outcome: Result<T, MemoError>,
    at: Instant,
}

impl<T> Deferred<T> {
    /// Create a pending value.
    pub fn new() -> Self {
        Self { outcome: OnceLock::new(), pending: Mutex::new(()), ready: Condvar::new() }
    }

    /// Assign the outcome and wake up all waiters.
    ///
    /// Returns `false` and leaves the value untouched if it was already
    /// assigned.
    pub fn complete(&self, outcome: Result<T, MemoError>) -> bool {
        if self.outcome.set(Settled { outcome, at: Instant::now() }).is_err() {
            return false;
        }
        // Taking the lock orders the wake-up after any waiter's last check.
        drop(self.pending.lock());
        self.ready.notify_all();
        true
    }

    /// Whether the outcome has been assigned.
    pub fn is_ready(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// When the outcome was assigned.
    pub fn completed_at(&self) -> Option<Instant> {
        self.outcome.get().map(|settled| settled.at)
    }
}

impl<T: Clone> Deferred<T> {
    /// Block until the outcome is assigned and return it.
    pub fn wait(&self) -> Result<T, MemoError> {
        if let Some(settled) = self.outcome.get() {
            return settled.outcome.clone();
        }

        let mut pending = self.pending.lock();
        loop {
            if let Some(settled) = self.outcome.get() {
                drop(pending);
                return settled.outcome.clone();
            }
            self.ready.wait(&mut pending);
        }
    }

    /// Return the outcome if it is already assigned.
    pub fn try_get(&self) -> Option<Result<T, MemoError>> {
        self.outcome.get().map(|settled| settled.outcome.clone())
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for Deferred<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.pad(if self.is_ready() { "Deferred(ready)" } else { "Deferred(pending)" })
    }
}
