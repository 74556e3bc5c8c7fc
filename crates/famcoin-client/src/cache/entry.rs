//! Cache entry state and type erasure for stored values and fetchers.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use crate::error::{ClientError, ClientResult};
use crate::keys::QueryKey;

pub(crate) type Erased = Arc<dyn Any + Send + Sync>;

pub(crate) type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, ClientResult<Erased>> + Send + Sync>;

/// One shared request; every caller of the same key awaits the same result.
pub(crate) type InFlight = Shared<BoxFuture<'static, ClientResult<Erased>>>;

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn erase_fetcher<T, F, Fut>(fetch: F) -> Fetcher
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ClientResult<T>> + Send + 'static,
{
    Arc::new(move || {
        let fut = fetch();
        async move { fut.await.map(|value| Arc::new(value) as Erased) }.boxed()
    })
}

pub(crate) fn downcast<T: Clone + 'static>(key: &QueryKey, value: &Erased) -> ClientResult<T> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| ClientError::Cache {
            message: format!("entry {} holds a value of another type", key),
        })
}

pub(crate) struct Entry {
    /// Distinguishes this entry from a later one under the same key.
    pub id: u64,
    pub value: Option<Erased>,
    pub updated_at: Option<Instant>,
    pub invalidated: bool,
    /// Bumped on every invalidation; a fetch started before the bump does not
    /// clear the invalidated flag.
    pub generation: u64,
    pub stale_time: Duration,
    pub observers: usize,
    pub last_used: Instant,
    pub fetcher: Option<Fetcher>,
    pub in_flight: Option<InFlight>,
    pub last_error: Option<ClientError>,
    pub fetch_count: u64,
}

impl Entry {
    pub fn new(stale_time: Duration) -> Self {
        Self {
            id: NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed),
            value: None,
            updated_at: None,
            invalidated: false,
            generation: 0,
            stale_time,
            observers: 0,
            last_used: Instant::now(),
            fetcher: None,
            in_flight: None,
            last_error: None,
            fetch_count: 0,
        }
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        match self.updated_at {
            _ if self.invalidated => true,
            Some(updated_at) => now.duration_since(updated_at) >= self.stale_time,
            None => true,
        }
    }

    pub fn is_evictable(&self, now: Instant, gc_time: Duration) -> bool {
        self.observers == 0
            && self.in_flight.is_none()
            && now.duration_since(self.last_used) >= gc_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;

    #[test]
    fn test_downcast_type_mismatch() {
        let value: Erased = Arc::new(42_i64);
        let key = keys::unread_count();
        assert_eq!(downcast::<i64>(&key, &value).unwrap(), 42);
        assert!(matches!(
            downcast::<String>(&key, &value),
            Err(ClientError::Cache { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness_window() {
        let mut entry = Entry::new(Duration::from_secs(60));
        let now = Instant::now();
        assert!(entry.is_stale(now), "empty entry is stale");

        entry.updated_at = Some(now);
        assert!(!entry.is_stale(now));
        assert!(!entry.is_stale(now + Duration::from_secs(59)));
        assert!(entry.is_stale(now + Duration::from_secs(60)));

        entry.invalidated = true;
        assert!(entry.is_stale(now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evictable_only_when_unobserved() {
        let mut entry = Entry::new(Duration::from_secs(1));
        let later = Instant::now() + Duration::from_secs(10);
        assert!(entry.is_evictable(later, Duration::from_secs(5)));

        entry.observers = 1;
        assert!(!entry.is_evictable(later, Duration::from_secs(5)));
    }
}
