use std::any::type_name;
use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::deferred::Deferred;
use crate::error::{ConfigError, MemoError, panic_message};
use crate::hash::hash;
use crate::key::{KeyArgs, KeyEncoder, KeyFormat};
use crate::store::{EvictionPolicy, Inserted, MapStore, Store};

/// The default store of a memoizer.
pub type DefaultStore<Out> = MapStore<Arc<Deferred<Out>>>;

/// A memoized function.
///
/// Calls with equal arguments share a single execution of the wrapped
/// function: of any number of concurrent callers for the same key, exactly
/// one (the initiator) runs the function, and all others wait for and
/// receive its output. Unrelated keys never wait for each other.
///
/// The wrapped function must not call the same memoizer with the same
/// arguments recursively, as it would wait for itself.
pub struct Memoizer<A, Out, S = DefaultStore<Out>> {
    name: String,
    id: u128,
    func: Box<dyn Fn(A) -> Out + Send + Sync>,
    encoder: KeyEncoder,
    /// The store, or `None` once disposed.
    store: RwLock<Option<S>>,
    /// Serializes clears against each other.
    clearing: Mutex<()>,
    counters: Counters,
}

#[derive(Default)]
struct Counters {
    invocations: AtomicU64,
    misses: AtomicU64,
    clears: AtomicU64,
    cleared: AtomicU64,
}

impl<A: KeyArgs, Out: Clone + Send + Sync> Memoizer<A, Out> {
    /// Memoize a function with default settings.
    ///
    /// The memoizer is named after the function's type.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(A) -> Out + Send + Sync + 'static,
    {
        Self::assemble(type_name::<F>().into(), func, KeyEncoder::default(), MapStore::new())
    }

    /// Memoize a function under an explicit name.
    pub fn named<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(A) -> Out + Send + Sync + 'static,
    {
        Self::assemble(name.into(), func, KeyEncoder::default(), MapStore::new())
    }

    /// Configure a memoizer.
    pub fn builder() -> Builder<A, Out> {
        Builder::new()
    }
}

impl<A, Out, S> Memoizer<A, Out, S>
where
    A: KeyArgs,
    Out: Clone + Send + Sync,
    S: Store<Arc<Deferred<Out>>>,
{
    fn assemble<F>(name: String, func: F, encoder: KeyEncoder, store: S) -> Self
    where
        F: Fn(A) -> Out + Send + Sync + 'static,
    {
        Self {
            id: hash(name.as_str()),
            name,
            func: Box::new(func),
            encoder,
            store: RwLock::new(Some(store)),
            clearing: Mutex::new(()),
            counters: Counters::default(),
        }
    }

    /// Call the function, or return the shared output of an earlier or
    /// concurrent call with the same arguments.
    pub fn invoke(&self, args: A) -> Result<Out, MemoError> {
        let guard = self.store.read();
        let store = guard.as_ref().ok_or_else(|| self.disposed())?;
        self.counters.invocations.fetch_add(1, Ordering::SeqCst);

        let key = self.encoder.encode(&args);
        let (deferred, initiator) = match store.get(&key) {
            Some(existing) => (existing, false),
            None => {
                let fresh = Arc::new(Deferred::new());
                match store.insert_if_absent(key.clone(), Arc::clone(&fresh)) {
                    Inserted::Stored => (fresh, true),
                    Inserted::Existing(existing) => (existing, false),
                }
            }
        };

        // Waiting must not block dispose.
        drop(guard);

        if !initiator {
            tracing::trace!(function = %self.name, %key, "memoized call hit");

            #[cfg(feature = "testing")]
            crate::testing::register_hit();

            return deferred.wait();
        }

        let misses = self.counters.misses.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(function = %self.name, %key, misses, "executing memoized function");

        let outcome = catch_unwind(AssertUnwindSafe(|| (self.func)(args))).map_err(|payload| {
            let message = panic_message(payload.as_ref());
            tracing::warn!(function = %self.name, %key, %message, "memoized function panicked");
            MemoError::Panicked { function: self.name.clone(), message }
        });
        deferred.complete(outcome.clone());

        #[cfg(feature = "testing")]
        crate::testing::register_miss();

        outcome
    }

    /// Remove all entries.
    ///
    /// Returns the number of removed entries. Computations that are in
    /// flight keep running and still deliver their output to their waiters,
    /// but later calls start afresh.
    pub fn clear(&self) -> Result<usize, MemoError> {
        let _clearing = self.clearing.lock();
        let guard = self.store.read();
        let store = guard.as_ref().ok_or_else(|| self.disposed())?;

        let mut removed = 0;
        for (key, deferred) in store.entries() {
            if store.remove(&key).is_none() {
                continue;
            }
            removed += 1;
            let total = self.counters.cleared.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::debug!(
                function = %self.name,
                %key,
                ready = deferred.is_ready(),
                total,
                "removed memoized entry"
            );
        }

        let clears = self.counters.clears.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(function = %self.name, removed, clears, "cleared memoizer");
        Ok(removed)
    }

    /// Drop all entries that expired under the store's eviction policy.
    ///
    /// Expired entries are already invisible to calls. Purging only releases
    /// their memory and does not count towards the clear counters.
    pub fn purge_expired(&self) -> Result<usize, MemoError> {
        let guard = self.store.read();
        let store = guard.as_ref().ok_or_else(|| self.disposed())?;
        let purged = store.purge_expired();
        if purged > 0 {
            tracing::debug!(function = %self.name, purged, "purged expired entries");
        }
        Ok(purged)
    }

    /// Release the store.
    ///
    /// Later calls to [`invoke`](Self::invoke), [`clear`](Self::clear), and
    /// [`purge_expired`](Self::purge_expired) fail with
    /// [`MemoError::Disposed`]. Returns `false` if the memoizer was already
    /// disposed.
    pub fn dispose(&self) -> bool {
        let Some(store) = self.store.write().take() else { return false };
        tracing::info!(function = %self.name, entries = store.len(), "disposed memoizer");
        true
    }

    /// Whether the memoizer was disposed.
    pub fn is_disposed(&self) -> bool {
        self.store.read().is_none()
    }

    /// The number of live entries, zero once disposed.
    pub fn len(&self) -> usize {
        self.store.read().as_ref().map_or(0, |store| store.len())
    }

    /// Whether no entry is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn disposed(&self) -> MemoError {
        MemoError::Disposed { function: self.name.clone() }
    }
}

impl<A, Out, S> Memoizer<A, Out, S> {
    /// The memoized function's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A 128-bit hash of the memoized function's name.
    pub fn id(&self) -> u128 {
        self.id
    }

    /// The encoder producing this memoizer's keys.
    pub fn encoder(&self) -> &KeyEncoder {
        &self.encoder
    }

    /// How often the function was called, hits and misses alike.
    pub fn invocations(&self) -> u64 {
        self.counters.invocations.load(Ordering::SeqCst)
    }

    /// How often a call executed the wrapped function.
    pub fn misses(&self) -> u64 {
        self.counters.misses.load(Ordering::SeqCst)
    }

    /// How often the memoizer was cleared.
    pub fn clears(&self) -> u64 {
        self.counters.clears.load(Ordering::SeqCst)
    }

    /// How many entries were removed across all clears.
    pub fn cleared_entries(&self) -> u64 {
        self.counters.cleared.load(Ordering::SeqCst)
    }

    /// A snapshot of all counters.
    ///
    /// Misses are read before invocations, and every call is counted as an
    /// invocation before it can count as a miss, so `misses <= invocations`
    /// holds for every snapshot.
    pub fn stats(&self) -> Stats {
        let misses = self.misses();
        let invocations = self.invocations();
        let cleared_entries = self.cleared_entries();
        let clears = self.clears();
        Stats { invocations, misses, clears, cleared_entries }
    }
}

impl<A, Out, S> Debug for Memoizer<A, Out, S> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Memoizer")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Counter values of a memoizer.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Stats {
    /// Calls, hits and misses alike.
    pub invocations: u64,
    /// Calls that executed the wrapped function.
    pub misses: u64,
    /// Clear operations.
    pub clears: u64,
    /// Entries removed across all clears.
    pub cleared_entries: u64,
}

impl Stats {
    /// Calls served from the cache or from a concurrent execution.
    pub fn hits(&self) -> u64 {
        self.invocations.saturating_sub(self.misses)
    }
}

/// Configures a [`Memoizer`].
pub struct Builder<A, Out> {
    name: Option<String>,
    policy: EvictionPolicy,
    format: KeyFormat,
    encoder: Option<KeyEncoder>,
    _marker: PhantomData<fn(A) -> Out>,
}

impl<A: KeyArgs, Out: Clone + Send + Sync> Builder<A, Out> {
    fn new() -> Self {
        Self {
            name: None,
            policy: EvictionPolicy::Forever,
            format: KeyFormat::Concatenated,
            encoder: None,
            _marker: PhantomData,
        }
    }

    /// Name the memoized function. Defaults to the function's type name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the eviction policy of the default store.
    pub fn policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the key format. Ignored if an explicit encoder is given.
    pub fn key_format(mut self, format: KeyFormat) -> Self {
        self.format = format;
        self
    }

    /// Use an existing encoder, sharing its identity registry.
    pub fn encoder(mut self, encoder: KeyEncoder) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Build the memoizer with the default store.
    pub fn build<F>(self, func: F) -> Result<Memoizer<A, Out>, ConfigError>
    where
        F: Fn(A) -> Out + Send + Sync + 'static,
    {
        let store = MapStore::with_policy(self.policy.validate()?);
        Ok(self.finish(func, store))
    }

    /// Build the memoizer on top of a custom store.
    ///
    /// The eviction policy is up to the store.
    pub fn build_with_store<S, F>(self, store: S, func: F) -> Memoizer<A, Out, S>
    where
        S: Store<Arc<Deferred<Out>>>,
        F: Fn(A) -> Out + Send + Sync + 'static,
    {
        self.finish(func, store)
    }

    fn finish<S, F>(self, func: F, store: S) -> Memoizer<A, Out, S>
    where
        S: Store<Arc<Deferred<Out>>>,
        F: Fn(A) -> Out + Send + Sync + 'static,
    {
        let name = self.name.unwrap_or_else(|| type_name::<F>().into());
        let encoder = self.encoder.unwrap_or_else(|| KeyEncoder::new(self.format));
        Memoizer::assemble(name, func, encoder, store)
    }
}
