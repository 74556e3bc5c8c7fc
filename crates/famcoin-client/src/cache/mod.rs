//! In-memory query cache.
//!
//! Holds the last fetched value per [`QueryKey`] together with its freshness
//! state. Reads are stale-while-revalidate: a stale value is returned at once
//! and refreshed in the background. Concurrent reads of one key share a single
//! request. Invalidation marks a key prefix stale and refetches the mounted
//! entries under it.
//!
//! Connectivity is tracked here as well: while offline every fetch is parked
//! before it reaches the network and resumes when [`QueryCache::set_online`]
//! flips back, at which point every mounted query is refetched once.
//!
//! The cache is an explicit handle. Create one per process (or per test),
//! pass it to whatever needs it, and call [`QueryCache::clear`] on teardown.
//!
//! Background fetches run on the tokio runtime current at the call site, or
//! the one the cache was created on. A cache built and driven entirely outside
//! a runtime only fetches when a read awaits the result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{ClientError, ClientResult};
use crate::keys::QueryKey;

mod entry;
mod focus;
mod observer;

use entry::{downcast, erase_fetcher, Entry, Erased, Fetcher, InFlight};
pub use focus::{Refetch, ScreenFocus};
pub use observer::{QueryObserver, QueryOptions};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Query cache handle. Clones share state.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    config: CacheConfig,
    entries: Mutex<HashMap<QueryKey, Entry>>,
    online: watch::Sender<bool>,
    updates: broadcast::Sender<QueryKey>,
    runtime: Option<Handle>,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("config", &self.inner.config)
            .field("entries", &self.len())
            .field("online", &self.is_online())
            .finish()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        let (online, _) = watch::channel(true);
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(CacheInner {
                config,
                entries: Mutex::new(HashMap::new()),
                online,
                updates,
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.inner.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- reads ----

    /// Read through the cache.
    ///
    /// Fresh value: returned without a request. Stale value: returned at once
    /// and refetched in the background. No value: fetched and awaited.
    pub async fn fetch_query<T, F, Fut>(
        &self,
        key: &QueryKey,
        options: &QueryOptions,
        fetch: F,
    ) -> ClientResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClientResult<T>> + Send + 'static,
    {
        self.read(key, Some(options), Some(erase_fetcher(fetch)))
            .await
    }

    pub(crate) async fn read<T: Clone + 'static>(
        &self,
        key: &QueryKey,
        options: Option<&QueryOptions>,
        fetcher: Option<Fetcher>,
    ) -> ClientResult<T> {
        let pending = {
            let now = Instant::now();
            let mut entries = self.lock();
            self.evict_expired(&mut entries, now);

            let default_stale = self.inner.config.stale_time();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(default_stale));
            if let Some(options) = options {
                entry.stale_time = options.stale_time.unwrap_or(default_stale);
            }
            if let Some(fetcher) = fetcher {
                entry.fetcher = Some(fetcher);
            }
            entry.last_used = now;

            if let Some(value) = entry.value.clone() {
                if entry.is_stale(now) {
                    debug!(key = %key, "serving stale value, revalidating");
                    self.start_fetch(key, entry);
                }
                return downcast(key, &value);
            }

            self.start_fetch(key, entry)
                .ok_or_else(|| ClientError::Cache {
                    message: format!("no fetcher registered for {}", key),
                })?
        };

        let value = pending.await?;
        downcast(key, &value)
    }

    /// Cached value, if any, without triggering a request.
    pub fn get_query_data<T: Clone + 'static>(&self, key: &QueryKey) -> Option<T> {
        let entries = self.lock();
        let value = entries.get(key)?.value.as_ref()?;
        value.downcast_ref::<T>().cloned()
    }

    /// Store a value as freshly fetched.
    pub fn set_query_data<T: Send + Sync + 'static>(&self, key: &QueryKey, value: T) {
        {
            let now = Instant::now();
            let mut entries = self.lock();
            let default_stale = self.inner.config.stale_time();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(default_stale));
            entry.value = Some(Arc::new(value));
            entry.updated_at = Some(now);
            entry.invalidated = false;
            entry.last_error = None;
            entry.last_used = now;
        }
        let _ = self.inner.updates.send(key.clone());
    }

    /// Whether the next read of `key` will hit the network.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.lock()
            .get(key)
            .map_or(true, |entry| entry.is_stale(Instant::now()))
    }

    /// Whether `key` was explicitly invalidated and not refetched since.
    ///
    /// Unlike [`QueryCache::is_stale`], time passing alone never sets this.
    pub fn is_invalidated(&self, key: &QueryKey) -> bool {
        self.lock().get(key).is_some_and(|entry| entry.invalidated)
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    /// Error of the most recent failed fetch, cleared by the next success.
    pub fn query_error(&self, key: &QueryKey) -> Option<ClientError> {
        self.lock().get(key)?.last_error.clone()
    }

    /// Number of network fetches started for `key`.
    pub fn fetch_count(&self, key: &QueryKey) -> u64 {
        self.lock().get(key).map_or(0, |entry| entry.fetch_count)
    }

    /// Keys currently held, in key order.
    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    // ---- refetch ----

    /// Force a refetch of `key` and await it.
    pub async fn refetch<T: Clone + 'static>(&self, key: &QueryKey) -> ClientResult<T> {
        let pending = {
            let mut entries = self.lock();
            let entry = entries.get_mut(key).ok_or_else(|| ClientError::Cache {
                message: format!("no cache entry for {}", key),
            })?;
            self.start_fetch(key, entry)
                .ok_or_else(|| ClientError::Cache {
                    message: format!("no fetcher registered for {}", key),
                })?
        };
        let value = pending.await?;
        downcast(key, &value)
    }

    /// Start a background refetch regardless of freshness.
    pub(crate) fn trigger_refetch(&self, key: &QueryKey) -> bool {
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) => self.start_fetch(key, entry).is_some(),
            None => false,
        }
    }

    /// Start a background refetch only if the entry is stale.
    pub fn refetch_if_stale(&self, key: &QueryKey) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.is_stale(now) => {
                debug!(key = %key, "refetching stale query");
                self.start_fetch(key, entry).is_some()
            }
            _ => false,
        }
    }

    // ---- invalidation ----

    /// Mark every entry under `prefix` stale.
    ///
    /// Mounted entries are refetched immediately; unmounted ones on their next
    /// read. Returns the keys that were marked. Safe to call from any thread.
    pub fn invalidate(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        let mut marked = Vec::new();
        let mut entries = self.lock();

        for (key, entry) in entries.iter_mut() {
            if !key.starts_with(prefix) {
                continue;
            }
            entry.invalidated = true;
            entry.generation += 1;
            if entry.observers > 0 {
                self.start_fetch(key, entry);
            }
            marked.push(key.clone());
        }

        debug!(prefix = %prefix, entries = marked.len(), "invalidated");
        marked
    }

    /// Drop every entry under `prefix`.
    pub fn remove(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Drop everything. Results of fetches still in flight are discarded.
    pub fn clear(&self) {
        let mut entries = self.lock();
        debug!(entries = entries.len(), "clearing query cache");
        entries.clear();
    }

    /// Evict unobserved entries unused for longer than the eviction window.
    pub fn collect_garbage(&self) -> usize {
        let mut entries = self.lock();
        self.evict_expired(&mut entries, Instant::now())
    }

    fn evict_expired(&self, entries: &mut HashMap<QueryKey, Entry>, now: Instant) -> usize {
        let gc_time = self.inner.config.gc_time();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_evictable(now, gc_time));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "evicted unused cache entries");
        }
        evicted
    }

    /// Wait until no fetch is in flight.
    pub async fn settle(&self) {
        loop {
            let pending: Vec<InFlight> = self
                .lock()
                .values()
                .filter_map(|entry| entry.in_flight.clone())
                .collect();
            if pending.is_empty() {
                return;
            }
            futures::future::join_all(pending).await;
        }
    }

    // ---- connectivity ----

    pub fn is_online(&self) -> bool {
        *self.inner.online.borrow()
    }

    /// Report connectivity. Going back online refetches every mounted query.
    ///
    /// Safe to call from any thread, e.g. a platform connectivity callback.
    pub fn set_online(&self, online: bool) {
        let was_online = self.inner.online.send_replace(online);

        if online && !was_online {
            let mut entries = self.lock();
            let mut refetched = 0;
            for (key, entry) in entries.iter_mut() {
                if entry.observers > 0 && self.start_fetch(key, entry).is_some() {
                    refetched += 1;
                }
            }
            info!(refetched, "back online, refetching mounted queries");
        } else if !online && was_online {
            info!("offline, pausing fetches");
        }
    }

    /// Resolve once the cache is online.
    pub async fn wait_online(&self) {
        let mut rx = self.inner.online.subscribe();
        let _ = rx.wait_for(|online| *online).await;
    }

    pub fn updates(&self) -> broadcast::Receiver<QueryKey> {
        self.inner.updates.subscribe()
    }

    // ---- mounting ----

    pub(crate) fn mount(&self, key: &QueryKey, options: &QueryOptions, fetcher: Fetcher) {
        let now = Instant::now();
        let mut entries = self.lock();
        let default_stale = self.inner.config.stale_time();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(default_stale));
        entry.observers += 1;
        entry.stale_time = options.stale_time.unwrap_or(default_stale);
        entry.fetcher = Some(fetcher);
        entry.last_used = now;

        if entry.is_stale(now) {
            self.start_fetch(key, entry);
        }
    }

    pub(crate) fn unmount(&self, key: &QueryKey) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
            entry.last_used = Instant::now();
        }
    }

    // ---- fetching ----

    /// Join the in-flight fetch for `key` or start one. `None` without fetcher.
    fn start_fetch(&self, key: &QueryKey, entry: &mut Entry) -> Option<InFlight> {
        if let Some(in_flight) = &entry.in_flight {
            return Some(in_flight.clone());
        }
        let fetcher = entry.fetcher.clone()?;

        let cache = self.clone();
        let fetch_key = key.clone();
        let entry_id = entry.id;
        let generation = entry.generation;

        let fut = async move {
            cache.wait_online().await;
            let result = fetcher().await;
            cache.complete_fetch(&fetch_key, entry_id, generation, &result);
            result
        }
        .boxed()
        .shared();

        entry.in_flight = Some(fut.clone());
        entry.fetch_count += 1;
        debug!(key = %key, fetch = entry.fetch_count, "fetch started");

        match Handle::try_current().ok().or_else(|| self.inner.runtime.clone()) {
            Some(runtime) => {
                runtime.spawn(fut.clone());
            }
            None => warn!(key = %key, "no tokio runtime, fetch runs when awaited"),
        }
        Some(fut)
    }

    fn complete_fetch(
        &self,
        key: &QueryKey,
        entry_id: u64,
        generation: u64,
        result: &ClientResult<Erased>,
    ) {
        {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(key).filter(|e| e.id == entry_id) else {
                debug!(key = %key, "entry dropped while fetching, discarding result");
                return;
            };
            entry.in_flight = None;

            match result {
                Ok(value) => {
                    entry.value = Some(value.clone());
                    entry.updated_at = Some(Instant::now());
                    entry.last_error = None;
                    if entry.generation == generation {
                        entry.invalidated = false;
                    } else if entry.observers > 0 {
                        // invalidated mid-flight: the result may predate the write
                        self.start_fetch(key, entry);
                    }
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "query fetch failed");
                    entry.last_error = Some(e.clone());
                }
            }
        }
        let _ = self.inner.updates.send(key.clone());
    }
}
