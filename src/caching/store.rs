//! # Cache Store
//!
//! The single process-wide mutable resource of the synchronization layer. The store
//! holds one entry per [`QueryKey`], deduplicates concurrent fetches of the same key,
//! serves stale data while refreshing it in the background, and notifies subscribed
//! listeners of every change.
//!
//! The store is explicitly constructed once per session and handed to every component
//! that needs it; cloning a `CacheStore` clones a handle, not the data.
//!
//! ## Locking
//! All entry state lives behind one `parking_lot::Mutex`. The lock is never held across
//! an `.await`, never while listeners run and never while a loader builds its future,
//! so listeners and loaders may call back into the store.
//!
//! ## Holds
//! A key under [`CacheStore::hold`] keeps whatever was last written to it: reads never
//! start a fetch for it and fetches that settle leave it alone. The mutation controller
//! holds a cart while its speculative value is on display.

use super::entry::{CacheEntry, CacheRead, EntryState, InFlight};
use super::key::{KeyFilter, QueryKey};
use super::policy::{PolicyTable, RefetchOnMount, StalenessTier, TierName};
use crate::core::error::SyncResult;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Cache store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Stale window applied to error entries so the next read retries quickly
    #[serde(with = "humantime_serde")]
    pub error_stale_window: Duration,

    /// Interval of the background eviction sweep
    #[serde(with = "humantime_serde")]
    pub gc_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            error_stale_window: Duration::from_secs(5),
            gc_interval: Duration::from_secs(60),
        }
    }
}

/// Kind of change delivered to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    /// A network fetch started
    Fetching,
    /// A fetch settled successfully
    Fetched,
    /// A fetch settled with an error
    FetchFailed,
    /// A value was written directly (speculative or confirmed)
    Written,
    /// A value was restored from a rollback snapshot
    RolledBack,
    /// The entry was marked stale
    Invalidated,
    /// The entry was garbage collected
    Evicted,
    /// The entry was removed explicitly
    Removed,
}

/// Change notification for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: QueryKey,
    pub kind: CacheEventKind,
}

/// Listener callback registered through [`CacheStore::subscribe`]
pub type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries
    pub entries: usize,

    /// Reads answered with fresh data
    pub hits: u64,

    /// Reads answered with stale data
    pub stale_hits: u64,

    /// Reads with nothing to show
    pub misses: u64,

    /// Number of loader invocations (network calls)
    pub loader_calls: u64,

    /// Fetches that joined an in-flight fetch instead of starting one
    pub dedup_joins: u64,

    /// Fetches that settled with an error
    pub failures: u64,

    /// Number of evicted entries
    pub evictions: u64,

    /// Number of active subscriptions
    pub subscribers: usize,
}

#[derive(Default)]
struct StoreCounters {
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    loader_calls: AtomicU64,
    dedup_joins: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

struct StoreState<V> {
    entries: HashMap<QueryKey, CacheEntry<V>>,
    listeners: HashMap<QueryKey, Vec<(u64, Listener)>>,
    next_listener_id: u64,
    /// Active hold count per key
    holds: HashMap<QueryKey, usize>,
}

struct StoreInner<V> {
    policy: PolicyTable,
    config: StoreConfig,
    state: Mutex<StoreState<V>>,
    counters: StoreCounters,
}

enum FetchStart<V> {
    Settled(SyncResult<V>),
    InFlight(InFlight<V>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    /// Start a fetch only when the entry is not fresh
    IfNeeded,
    /// Start a fetch regardless of freshness
    Force,
}

/// Keyed cache of server-authoritative data
pub struct CacheStore<V> {
    inner: Arc<StoreInner<V>>,
}

impl<V> Clone for CacheStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> fmt::Debug for CacheStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<V> CacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new store
    pub fn new(policy: PolicyTable, config: StoreConfig) -> Self {
        info!(
            error_stale_window = ?config.error_stale_window,
            "Cache store initialized"
        );
        Self {
            inner: Arc::new(StoreInner {
                policy,
                config,
                state: Mutex::new(StoreState {
                    entries: HashMap::new(),
                    listeners: HashMap::new(),
                    next_listener_id: 0,
                    holds: HashMap::new(),
                }),
                counters: StoreCounters::default(),
            }),
        }
    }

    /// The policy table the store was built with
    pub fn policy(&self) -> &PolicyTable {
        &self.inner.policy
    }

    /// Resolve a tier name against the policy table
    pub fn tier(&self, name: TierName) -> StalenessTier {
        self.inner.policy.tier(name)
    }

    /// Synchronous read
    ///
    /// Returns whatever is cached; when the result is empty or stale the caller is
    /// expected to `fetch`. The first read of a key registers an empty entry.
    pub fn read(&self, key: &QueryKey, tier: TierName) -> CacheRead<V> {
        let now = Instant::now();
        let read = {
            let mut state = self.inner.state.lock();
            let entry = self.entry_mut(&mut state, key, tier, now);
            entry.snapshot(now, self.inner.config.error_stale_window)
        };

        let counter = match (&read.value, read.is_stale) {
            (None, _) => &self.inner.counters.misses,
            (Some(_), true) => &self.inner.counters.stale_hits,
            (Some(_), false) => &self.inner.counters.hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        read
    }

    /// Value currently cached for a key, without registering an entry
    pub fn peek(&self, key: &QueryKey) -> Option<V> {
        let state = self.inner.state.lock();
        state.entries.get(key).and_then(|entry| entry.value.clone())
    }

    /// Derived state of a key
    pub fn state(&self, key: &QueryKey) -> EntryState {
        let now = Instant::now();
        let state = self.inner.state.lock();
        state
            .entries
            .get(key)
            .map(|entry| entry.state_at(now, self.inner.config.error_stale_window))
            .unwrap_or(EntryState::Empty)
    }

    /// Whether the key holds fresh data
    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        self.state(key) == EntryState::Fresh
    }

    /// Whether a fetch is in flight for the key
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        let state = self.inner.state.lock();
        state
            .entries
            .get(key)
            .map(|entry| entry.in_flight.is_some())
            .unwrap_or(false)
    }

    /// Fetch a key through `loader`
    ///
    /// The fetch starts when this method is called, not when the returned future is
    /// first polled:
    /// - if a fetch is already in flight for the key, its result is shared
    /// - if the entry is fresh, the cached value is returned without calling `loader`
    /// - if the entry holds an error that is still within its short stale window, that
    ///   error is returned without calling `loader`
    /// - otherwise `loader` is invoked once and its result settles the entry
    ///
    /// The fetch runs on a spawned task, so it settles even if every caller stops
    /// waiting for it. `loader` is invoked without the store lock held and may read
    /// the store.
    pub fn fetch<F, Fut>(
        &self,
        key: QueryKey,
        tier: TierName,
        loader: F,
    ) -> BoxFuture<'static, SyncResult<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<V>> + Send + 'static,
    {
        match self.begin_fetch(key, tier, loader, FetchMode::IfNeeded) {
            FetchStart::Settled(result) => future::ready(result).boxed(),
            FetchStart::InFlight(shared) => shared.boxed(),
        }
    }

    /// Fetch a key even if its cached data is fresh
    ///
    /// Still joins an in-flight fetch rather than starting a second one.
    pub fn refresh<F, Fut>(
        &self,
        key: QueryKey,
        tier: TierName,
        loader: F,
    ) -> BoxFuture<'static, SyncResult<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<V>> + Send + 'static,
    {
        match self.begin_fetch(key, tier, loader, FetchMode::Force) {
            FetchStart::Settled(result) => future::ready(result).boxed(),
            FetchStart::InFlight(shared) => shared.boxed(),
        }
    }

    /// Stale-while-revalidate read path for the presentation layer
    ///
    /// - fresh data is returned as is
    /// - stale data is returned immediately while a background refresh runs
    /// - with nothing to show, the fetch is awaited
    ///
    /// A missing resource resolves to `Ok(None)` rather than an error.
    pub async fn query<F, Fut>(
        &self,
        key: QueryKey,
        tier: TierName,
        loader: F,
    ) -> SyncResult<Option<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<V>> + Send + 'static,
    {
        let read = self.read(&key, tier);

        if let Some(value) = read.value {
            if read.is_stale && !read.is_fetching {
                debug!(key = %key, "Serving stale value while refreshing");
                // Settlement is handled by the spawned fetch task
                let _ = self.begin_fetch(key, tier, loader, FetchMode::IfNeeded);
            }
            return Ok(Some(value));
        }

        match self.fetch(key, tier, loader).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Best-effort fetch used for speculative reads
    ///
    /// Does nothing when the key is fresh or already being fetched. Failures are
    /// recorded as error entries and logged, never returned.
    pub fn prefetch<F, Fut>(&self, key: QueryKey, tier: TierName, loader: F) -> BoxFuture<'static, ()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<V>> + Send + 'static,
    {
        if self.is_fresh(&key) || self.is_fetching(&key) {
            debug!(key = %key, "Skipping prefetch of fresh or in-flight key");
            return future::ready(()).boxed();
        }

        let fetch = self.fetch(key.clone(), tier, loader);
        async move {
            if let Err(err) = fetch.await {
                warn!(key = %key, error = %err, "Prefetch failed");
            }
        }
        .boxed()
    }

    /// Direct synchronous write
    ///
    /// Used for speculative values and for server-confirmed results. Any fetch that
    /// was started before this write will not overwrite it when it settles.
    pub fn write(&self, key: QueryKey, value: V, tier: TierName) {
        self.put(key, value, tier, CacheEventKind::Written);
    }

    /// Write a rollback snapshot back into the store
    pub fn restore(&self, key: QueryKey, value: V, tier: TierName) {
        self.put(key, value, tier, CacheEventKind::RolledBack);
    }

    fn put(&self, key: QueryKey, value: V, tier: TierName, kind: CacheEventKind) {
        let now = Instant::now();
        {
            let mut state = self.inner.state.lock();
            let entry = self.entry_mut(&mut state, &key, tier, now);
            entry.put(value, now);
        }
        debug!(key = %key, kind = ?kind, "Cache entry written");
        self.notify(vec![CacheEvent { key, kind }]);
    }

    /// Mark matching entries stale
    ///
    /// Values stay readable; the next `fetch` or `query` refreshes them. Returns the
    /// number of entries matched.
    pub fn invalidate<K: Into<KeyFilter>>(&self, filter: K) -> usize {
        let filter = filter.into();
        let events: Vec<CacheEvent> = {
            let mut state = self.inner.state.lock();
            state
                .entries
                .values_mut()
                .filter(|entry| filter.matches(&entry.key))
                .map(|entry| {
                    entry.invalidated = true;
                    entry.invalidations += 1;
                    CacheEvent {
                        key: entry.key.clone(),
                        kind: CacheEventKind::Invalidated,
                    }
                })
                .collect()
        };

        let count = events.len();
        debug!(filter = ?filter, count, "Invalidated cache entries");
        self.notify(events);
        count
    }

    /// Remove an entry outright
    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = {
            let mut state = self.inner.state.lock();
            state.entries.remove(key).is_some()
        };

        if removed {
            self.notify(vec![CacheEvent {
                key: key.clone(),
                kind: CacheEventKind::Removed,
            }]);
        }
        removed
    }

    /// Register a listener for changes to one key
    ///
    /// The key is pinned against eviction while the returned subscription is alive.
    pub fn subscribe<F>(&self, key: QueryKey, listener: F) -> Subscription<V>
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let id = {
            let mut state = self.inner.state.lock();
            let id = state.next_listener_id;
            state.next_listener_id += 1;
            state
                .listeners
                .entry(key.clone())
                .or_default()
                .push((id, Arc::new(listener)));
            id
        };

        debug!(key = %key, id, "Listener subscribed");
        Subscription {
            store: Arc::downgrade(&self.inner),
            key,
            id,
            active: true,
        }
    }

    /// Keep fetch results from replacing the key's value until the guard is dropped
    ///
    /// Holds nest; the key is released when the last guard goes. A held key is never
    /// evicted. Direct writes, restores and removals still apply.
    pub fn hold(&self, key: QueryKey) -> Hold<V> {
        {
            let mut state = self.inner.state.lock();
            *state.holds.entry(key.clone()).or_insert(0) += 1;
        }

        debug!(key = %key, "Key held");
        Hold {
            store: Arc::downgrade(&self.inner),
            key,
            active: true,
        }
    }

    /// Whether any hold is active for the key
    pub fn is_held(&self, key: &QueryKey) -> bool {
        self.inner.state.lock().holds.contains_key(key)
    }

    /// Number of active listeners for a key
    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        let state = self.inner.state.lock();
        state.listeners.get(key).map(Vec::len).unwrap_or(0)
    }

    /// Evict entries past their gc window that nobody is subscribed to
    ///
    /// Entries with a fetch in flight are kept.
    pub fn evict(&self, now: Instant) -> Vec<QueryKey> {
        let evicted: Vec<QueryKey> = {
            let mut state = self.inner.state.lock();
            let StoreState {
                entries,
                listeners,
                holds,
                ..
            } = &mut *state;

            let candidates: Vec<QueryKey> = entries
                .values()
                .filter(|entry| {
                    entry.in_flight.is_none()
                        && !holds.contains_key(&entry.key)
                        && listeners.get(&entry.key).map_or(true, Vec::is_empty)
                        && entry.is_expired_at(now)
                })
                .map(|entry| entry.key.clone())
                .collect();

            for key in &candidates {
                entries.remove(key);
            }
            candidates
        };

        if !evicted.is_empty() {
            self.inner
                .counters
                .evictions
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            debug!("Evicted {} cache entries", evicted.len());
        }

        evicted
    }

    /// Spawn a task that periodically evicts expired entries
    ///
    /// The task stops by itself once the store is dropped.
    pub fn start_gc_sweeper(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.gc_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("Cache store dropped, stopping gc sweeper");
                    break;
                };
                CacheStore { inner }.evict(Instant::now());
            }
        })
    }

    /// Whether a newly mounted view should fetch the key
    pub fn needs_fetch_on_mount(&self, key: &QueryKey, tier: TierName) -> bool {
        let now = Instant::now();
        let state = self.inner.state.lock();
        let Some(entry) = state.entries.get(key) else {
            return true;
        };

        if entry.in_flight.is_some() || (entry.value.is_some() && state.holds.contains_key(key)) {
            return false;
        }

        if entry.value.is_none() {
            return entry.is_stale_at(now, self.inner.config.error_stale_window);
        }

        match self.inner.policy.tier(tier).refetch_on_mount {
            RefetchOnMount::Always => true,
            RefetchOnMount::IfStale => entry.is_stale_at(now, self.inner.config.error_stale_window),
            RefetchOnMount::Never => false,
        }
    }

    /// Subscribed keys that should be refetched when the storefront regains focus
    pub fn keys_to_refetch_on_focus(&self) -> Vec<(QueryKey, TierName)> {
        let now = Instant::now();
        let state = self.inner.state.lock();
        state
            .entries
            .values()
            .filter(|entry| {
                entry.tier.refetch_on_focus
                    && entry.in_flight.is_none()
                    && !state.holds.contains_key(&entry.key)
                    && state.listeners.get(&entry.key).map_or(false, |l| !l.is_empty())
                    && entry.is_stale_at(now, self.inner.config.error_stale_window)
            })
            .map(|entry| (entry.key.clone(), entry.tier_name))
            .collect()
    }

    /// Collect statistics
    pub fn stats(&self) -> CacheStats {
        let (entries, subscribers) = {
            let state = self.inner.state.lock();
            (
                state.entries.len(),
                state.listeners.values().map(Vec::len).sum(),
            )
        };
        let counters = &self.inner.counters;

        CacheStats {
            entries,
            hits: counters.hits.load(Ordering::Relaxed),
            stale_hits: counters.stale_hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            loader_calls: counters.loader_calls.load(Ordering::Relaxed),
            dedup_joins: counters.dedup_joins.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
            subscribers,
        }
    }

    fn entry_mut<'a>(
        &self,
        state: &'a mut StoreState<V>,
        key: &QueryKey,
        tier: TierName,
        now: Instant,
    ) -> &'a mut CacheEntry<V> {
        state.entries.entry(key.clone()).or_insert_with(|| {
            CacheEntry::new(key.clone(), tier, self.inner.policy.tier(tier), now)
        })
    }

    fn begin_fetch<F, Fut>(
        &self,
        key: QueryKey,
        tier: TierName,
        loader: F,
        mode: FetchMode,
    ) -> FetchStart<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<V>> + Send + 'static,
    {
        {
            let mut state = self.inner.state.lock();
            if let Some(start) = self.existing_fetch(&mut state, &key, tier, mode) {
                return start;
            }
        }

        let load = loader();

        let shared = {
            let mut state = self.inner.state.lock();
            // Another caller may have started or settled a fetch while the loader ran
            if let Some(start) = self.existing_fetch(&mut state, &key, tier, mode) {
                return start;
            }

            let entry = self.entry_mut(&mut state, &key, tier, Instant::now());
            self.inner.counters.loader_calls.fetch_add(1, Ordering::Relaxed);
            let started_version = entry.version;
            let started_invalidations = entry.invalidations;
            let weak = Arc::downgrade(&self.inner);
            let settle_key = key.clone();

            let shared = async move {
                let result = load.await;
                if let Some(inner) = weak.upgrade() {
                    CacheStore { inner }.settle(
                        settle_key,
                        started_version,
                        started_invalidations,
                        &result,
                    );
                }
                result
            }
            .boxed()
            .shared();

            entry.in_flight = Some(shared.clone());
            shared
        };

        debug!(key = %key, "Fetch started");
        tokio::spawn(shared.clone().map(|_| ()));
        self.notify(vec![CacheEvent {
            key,
            kind: CacheEventKind::Fetching,
        }]);

        FetchStart::InFlight(shared)
    }

    /// Answer a fetch without starting one, if possible
    fn existing_fetch(
        &self,
        state: &mut StoreState<V>,
        key: &QueryKey,
        tier: TierName,
        mode: FetchMode,
    ) -> Option<FetchStart<V>> {
        let now = Instant::now();
        let error_window = self.inner.config.error_stale_window;
        let held = state.holds.contains_key(key);
        let entry = self.entry_mut(state, key, tier, now);

        if let Some(in_flight) = &entry.in_flight {
            self.inner.counters.dedup_joins.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Joining in-flight fetch");
            return Some(FetchStart::InFlight(in_flight.clone()));
        }

        if held {
            if let Some(value) = &entry.value {
                debug!(key = %key, "Key is held, serving cached value");
                return Some(FetchStart::Settled(Ok(value.clone())));
            }
        }

        if mode == FetchMode::IfNeeded && !entry.is_stale_at(now, error_window) {
            if let Some(error) = &entry.error {
                return Some(FetchStart::Settled(Err(error.clone())));
            }
            if let Some(value) = &entry.value {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(FetchStart::Settled(Ok(value.clone())));
            }
        }

        None
    }

    fn settle(
        &self,
        key: QueryKey,
        started_version: u64,
        started_invalidations: u64,
        result: &SyncResult<V>,
    ) {
        let now = Instant::now();
        let kind = {
            let mut state = self.inner.state.lock();
            let held = state.holds.contains_key(&key);
            let Some(entry) = state.entries.get_mut(&key) else {
                debug!(key = %key, "Fetch settled for removed entry");
                return;
            };
            entry.in_flight = None;

            if entry.version != started_version {
                debug!(key = %key, "Fetch result superseded by a newer write");
                None
            } else if held && entry.value.is_some() {
                debug!(key = %key, "Fetch result discarded for held key");
                None
            } else {
                match result {
                    Ok(value) => {
                        entry.value = Some(value.clone());
                        entry.error = None;
                        entry.failed_at = None;
                        entry.fetched_at = Some(now);
                        // An invalidation that raced the fetch keeps the entry stale
                        entry.invalidated = entry.invalidations != started_invalidations;
                        Some(CacheEventKind::Fetched)
                    }
                    Err(err) => {
                        entry.error = Some(err.clone());
                        entry.failed_at = Some(now);
                        entry.invalidated = false;
                        Some(CacheEventKind::FetchFailed)
                    }
                }
            }
        };

        match kind {
            Some(CacheEventKind::FetchFailed) => {
                self.inner.counters.failures.fetch_add(1, Ordering::Relaxed);
                if let Err(err) = result {
                    debug!(key = %key, error = %err, "Fetch failed");
                }
            }
            Some(_) => debug!(key = %key, "Fetch settled"),
            None => {}
        }

        if let Some(kind) = kind {
            self.notify(vec![CacheEvent { key, kind }]);
        }
    }

    fn notify(&self, events: Vec<CacheEvent>) {
        if events.is_empty() {
            return;
        }

        let deliveries: Vec<(Listener, CacheEvent)> = {
            let state = self.inner.state.lock();
            events
                .into_iter()
                .flat_map(|event| {
                    state
                        .listeners
                        .get(&event.key)
                        .into_iter()
                        .flatten()
                        .map(move |(_, listener)| (listener.clone(), event.clone()))
                        .collect::<Vec<_>>()
                })
                .collect()
        };

        for (listener, event) in deliveries {
            listener(&event);
        }
    }
}

/// Handle returned by [`CacheStore::subscribe`]
///
/// Dropping the handle unsubscribes the listener.
pub struct Subscription<V> {
    store: Weak<StoreInner<V>>,
    key: QueryKey,
    id: u64,
    active: bool,
}

impl<V> Subscription<V> {
    /// Key the listener is registered for
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Remove the listener
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        if let Some(inner) = self.store.upgrade() {
            let mut state = inner.state.lock();
            if let Some(listeners) = state.listeners.get_mut(&self.key) {
                listeners.retain(|(id, _)| *id != self.id);
                if listeners.is_empty() {
                    state.listeners.remove(&self.key);
                }
            }
        }
    }
}

impl<V> Drop for Subscription<V> {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Handle returned by [`CacheStore::hold`]
///
/// Dropping the handle releases the hold.
pub struct Hold<V> {
    store: Weak<StoreInner<V>>,
    key: QueryKey,
    active: bool,
}

impl<V> Hold<V> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Release the hold
    pub fn release(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        if let Some(inner) = self.store.upgrade() {
            let mut state = inner.state.lock();
            if let Some(count) = state.holds.get_mut(&self.key) {
                *count -= 1;
                if *count == 0 {
                    state.holds.remove(&self.key);
                }
            }
        }
        debug!(key = %self.key, "Key released");
    }
}

impl<V> Drop for Hold<V> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<V> fmt::Debug for Hold<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hold").field("key", &self.key).finish()
    }
}

impl<V> fmt::Debug for Subscription<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
