//! Mounted queries.
//!
//! A [`QueryObserver`] is the cache-side half of a screen subscribing to a key.
//! While it lives the entry is protected from eviction, refetched on
//! invalidation and reconnect, and optionally polled. Dropping it stops
//! delivery and polling; a request already in flight still completes and
//! lands in the cache.

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::entry::{erase_fetcher, Fetcher};
use super::focus::Refetch;
use super::QueryCache;
use crate::error::{ClientError, ClientResult};
use crate::keys::QueryKey;

/// Per-query overrides of the cache defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Freshness window; falls back to [`crate::CacheConfig::stale_time`].
    pub stale_time: Option<Duration>,
    /// Poll at this fixed interval while mounted.
    pub refetch_interval: Option<Duration>,
}

impl QueryOptions {
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn with_refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }
}

/// A mounted query producing values of type `T`.
pub struct QueryObserver<T> {
    cache: QueryCache,
    key: QueryKey,
    options: QueryOptions,
    fetcher: Fetcher,
    updates: broadcast::Receiver<QueryKey>,
    poller: Option<JoinHandle<()>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for QueryObserver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryObserver")
            .field("key", &self.key)
            .field("options", &self.options)
            .field("polling", &self.poller.is_some())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> QueryObserver<T> {
    /// Mount `key`. Starts a fetch when the entry is missing or stale.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new<F, Fut>(cache: &QueryCache, key: QueryKey, options: QueryOptions, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClientResult<T>> + Send + 'static,
    {
        let fetcher = erase_fetcher(fetch);
        // subscribe before mounting so the first result is not missed
        let updates = cache.updates();
        cache.mount(&key, &options, fetcher.clone());

        let poller = match options.refetch_interval {
            Some(every) if every.is_zero() => {
                warn!(key = %key, "zero refetch interval, polling disabled");
                None
            }
            Some(every) => Some(spawn_poller(cache.clone(), key.clone(), every)),
            None => None,
        };

        Self {
            cache: cache.clone(),
            key,
            options,
            fetcher,
            updates,
            poller,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Current value; awaits the first fetch if nothing is cached yet.
    pub async fn data(&self) -> ClientResult<T> {
        self.cache
            .read(&self.key, Some(&self.options), Some(self.fetcher.clone()))
            .await
    }

    /// Cached value without waiting or fetching.
    pub fn cached(&self) -> Option<T> {
        self.cache.get_query_data(&self.key)
    }

    pub fn error(&self) -> Option<ClientError> {
        self.cache.query_error(&self.key)
    }

    pub fn is_stale(&self) -> bool {
        self.cache.is_stale(&self.key)
    }

    pub fn is_fetching(&self) -> bool {
        self.cache.is_fetching(&self.key)
    }

    /// Force a refetch and await the result.
    pub async fn refetch(&self) -> ClientResult<T> {
        self.cache.refetch(&self.key).await
    }

    /// Wait until this key is written (new value or failed fetch).
    ///
    /// Returns `false` once the cache is gone.
    pub async fn changed(&mut self) -> bool {
        loop {
            match self.updates.recv().await {
                Ok(key) if key == self.key => return true,
                Ok(_) => continue,
                // missed some updates, ours may be among them
                Err(RecvError::Lagged(_)) => return true,
                Err(RecvError::Closed) => return false,
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Refetch for QueryObserver<T> {
    fn refetch_if_stale(&self) -> bool {
        self.cache.refetch_if_stale(&self.key)
    }
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        self.cache.unmount(&self.key);
    }
}

fn spawn_poller(cache: QueryCache, key: QueryKey, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately; mounting already fetched
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!(key = %key, "polling");
            cache.trigger_refetch(&key);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::keys::{self, TaskFilter};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counter_fetch(
        calls: Arc<AtomicU32>,
    ) -> impl Fn() -> futures::future::BoxFuture<'static, ClientResult<u32>> + Send + Sync + 'static
    {
        use futures::FutureExt;
        move || {
            let calls = calls.clone();
            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }.boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_fetches_once_and_delivers() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let mut observer = QueryObserver::new(
            &cache,
            keys::children(),
            QueryOptions::default(),
            counter_fetch(calls.clone()),
        );

        assert!(observer.changed().await);
        assert_eq!(observer.cached(), Some(1));
        assert_eq!(observer.data().await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_observer_shares_fresh_value() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let key = keys::wallet_balance(None);

        let first = QueryObserver::new(&cache, key.clone(), QueryOptions::default(), counter_fetch(calls.clone()));
        assert_eq!(first.data().await.unwrap(), 1);
        let second = QueryObserver::new(&cache, key, QueryOptions::default(), counter_fetch(calls.clone()));
        assert_eq!(second.data().await.unwrap(), 1);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_refetches_mounted_query() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let key = keys::task_list(&TaskFilter::default());
        let mut observer =
            QueryObserver::new(&cache, key, QueryOptions::default(), counter_fetch(calls.clone()));
        assert!(observer.changed().await);

        cache.invalidate(&crate::keys::Domain::Tasks.root());
        assert!(observer.changed().await);

        assert_eq!(observer.cached(), Some(2));
        assert!(!observer.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_stops_on_drop() {
        let cache = QueryCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicU32::new(0));
        let key = keys::task_list(&TaskFilter::default());
        let options = QueryOptions::default().with_refetch_interval(Duration::from_secs(30));

        let observer = QueryObserver::new(&cache, key.clone(), options, counter_fetch(calls.clone()));
        cache.settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        cache.settle().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        cache.settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3, "two polls after mount");

        drop(observer);
        tokio::time::sleep(Duration::from_secs(120)).await;
        cache.settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_refetch_interval_mounts_without_polling() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let options = QueryOptions::default().with_refetch_interval(Duration::ZERO);

        let observer = QueryObserver::new(&cache, keys::children(), options, counter_fetch(calls.clone()));
        assert_eq!(observer.data().await.unwrap(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        cache.settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_observer_does_not_abort_in_flight_fetch() {
        let cache = QueryCache::default();
        let key = keys::gamification(None);
        let observer = QueryObserver::new(&cache, key.clone(), QueryOptions::default(), || async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(5_u32)
        });
        drop(observer);

        cache.settle().await;
        assert_eq!(cache.get_query_data::<u32>(&key), Some(5));
    }
}
