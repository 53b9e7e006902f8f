//! Request deduplication: at most one cached request per argument tuple.

use std::fmt::Debug;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::request::ServerRequest;

use super::ordered::{BoundedOrderedCache, CacheStats, DEFAULT_SIZE_LIMIT};

/// Trailing flag of every cache key: the cached request came from a real
/// fetch, never from another cache lookup.
const NOT_FROM_CACHE: bool = false;

/// Cache key: the caller's arguments plus a fixed trailing flag.
///
/// Two keys are equal when their arguments are equal by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey<A> {
    args: A,
    from_cache: bool,
}

impl<A> CacheKey<A> {
    pub fn new(args: A) -> Self {
        Self {
            args,
            from_cache: NOT_FROM_CACHE,
        }
    }

    pub fn args(&self) -> &A {
        &self.args
    }

    pub fn from_cache(&self) -> bool {
        self.from_cache
    }
}

type FetchFn<A, V> = dyn Fn(&A) -> ServerRequest<V> + Send + Sync;

/// Wraps one fetch function and caches the request handles it returns.
///
/// The lock covers lookup and insert as one step, so concurrent callers
/// asking for the same arguments trigger exactly one fetch and all receive
/// the same handle. The fetch only *creates* the request (the work runs on
/// the runtime), so the lock is never held while a request is in flight.
///
/// A cached request that was cancelled stays cached for [`get`](Self::get);
/// [`get_fresh`](Self::get_fresh) replaces it.
pub struct FunCache<A, V> {
    name: &'static str,
    fetch: Box<FetchFn<A, V>>,
    cache: Mutex<BoundedOrderedCache<CacheKey<A>, ServerRequest<V>>>,
}

impl<A, V> FunCache<A, V>
where
    A: Clone + PartialEq + Debug,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache around `fetch` with the default size limit.
    pub fn new<F>(name: &'static str, fetch: F) -> Self
    where
        F: Fn(&A) -> ServerRequest<V> + Send + Sync + 'static,
    {
        Self::with_limit(name, DEFAULT_SIZE_LIMIT, fetch)
    }

    /// Creates a cache around `fetch` holding at most `limit` requests.
    pub fn with_limit<F>(name: &'static str, limit: usize, fetch: F) -> Self
    where
        F: Fn(&A) -> ServerRequest<V> + Send + Sync + 'static,
    {
        Self {
            name,
            fetch: Box::new(fetch),
            cache: Mutex::new(BoundedOrderedCache::new(limit)),
        }
    }

    // Cache operations are total: a panic in another holder does not
    // invalidate the bookkeeping, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, BoundedOrderedCache<CacheKey<A>, ServerRequest<V>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the cached request for `args`, fetching it on a miss.
    pub fn get(&self, args: &A) -> ServerRequest<V> {
        let key = CacheKey::new(args.clone());
        let mut cache = self.lock();

        if let Some(request) = cache.get(&key) {
            tracing::trace!(cache = self.name, request_id = %request.id(), "Cache hit");
            return request;
        }
        self.fetch_into(&mut cache, key)
    }

    /// Like [`get`](Self::get), but a cached request that was cancelled is
    /// evicted and fetched again.
    ///
    /// The check, eviction and refetch happen under one lock, so callers
    /// racing on the same cancelled request still start a single fetch.
    pub fn get_fresh(&self, args: &A) -> ServerRequest<V> {
        let key = CacheKey::new(args.clone());
        let mut cache = self.lock();

        match cache.get(&key) {
            Some(request) if !request.is_cancelled() => {
                tracing::trace!(cache = self.name, request_id = %request.id(), "Cache hit");
                return request;
            }
            Some(request) => {
                tracing::debug!(
                    cache = self.name,
                    request_id = %request.id(),
                    "Cached request was cancelled, refetching"
                );
                cache.remove(&key);
            }
            None => {}
        }
        self.fetch_into(&mut cache, key)
    }

    fn fetch_into(
        &self,
        cache: &mut BoundedOrderedCache<CacheKey<A>, ServerRequest<V>>,
        key: CacheKey<A>,
    ) -> ServerRequest<V> {
        let request = (self.fetch)(key.args());
        tracing::debug!(
            cache = self.name,
            request_id = %request.id(),
            args = ?key.args(),
            "Cache miss, request started"
        );
        cache.add(key, request.clone());
        request
    }

    /// Evicts the request cached for `args`.
    pub fn remove(&self, args: &A) {
        self.lock().remove(&CacheKey::new(args.clone()));
    }

    pub fn size(&self) -> usize {
        self.lock().size()
    }

    pub fn limit(&self) -> usize {
        self.lock().limit()
    }

    /// Sets a new limit; this also clears the cache.
    pub fn set_limit(&self, limit: usize) {
        self.lock().set_limit(limit);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    use crate::types::errors::ServerError;

    fn counting_cache(calls: Arc<AtomicUsize>) -> FunCache<String, usize> {
        FunCache::new("test", move |id: &String| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            ServerRequest::immediate(format!("fetch {id}"), Ok(n))
        })
    }

    #[test]
    fn test_cache_key_equality() {
        let a = CacheKey::new(("mod.id".to_string(), 3u32));
        let b = CacheKey::new(("mod.id".to_string(), 3u32));
        let c = CacheKey::new(("mod.id".to_string(), 4u32));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.from_cache());
        assert_eq!(a.args().1, 3);
    }

    #[test]
    fn test_hit_returns_same_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(calls.clone());

        let first = cache.get(&"a".to_string());
        let second = cache.get(&"a".to_string());

        assert!(first.same_as(&second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_distinct_args_fetch_separately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(calls.clone());

        let a = cache.get(&"a".to_string());
        let b = cache.get(&"b".to_string());

        assert!(!a.same_as(&b));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remove_forces_refetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(calls.clone());

        let first = cache.get(&"a".to_string());
        cache.remove(&"a".to_string());
        let second = cache.get(&"a".to_string());

        assert!(!first.same_as(&second));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_set_limit_clears_and_applies() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(calls);

        cache.get(&"a".to_string());
        cache.get(&"b".to_string());
        cache.set_limit(1);

        assert_eq!(cache.size(), 0);
        assert_eq!(cache.limit(), 1);

        cache.get(&"a".to_string());
        cache.get(&"b".to_string());
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_fetch() {
        const CALLERS: usize = 16;

        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(calls.clone());
        let barrier = Barrier::new(CALLERS);

        let handles: Vec<ServerRequest<usize>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..CALLERS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        cache.get(&"shared".to_string())
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handles.iter().all(|h| h.same_as(&handles[0])));
    }

    #[tokio::test]
    async fn test_cancelled_request_stays_until_removed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache: FunCache<String, usize> = FunCache::new("pending", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            ServerRequest::spawn("slow", |_| async {
                std::future::pending::<()>().await;
                Ok(0)
            })
        });

        let first = cache.get(&"a".to_string());
        first.cancel();

        let cached = cache.get(&"a".to_string());
        assert!(cached.same_as(&first));
        assert_eq!(cached.wait().await, Err(ServerError::Cancelled));

        cache.remove(&"a".to_string());
        let fresh = cache.get(&"a".to_string());
        assert!(!fresh.same_as(&first));
        assert!(fresh.is_pending());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        fresh.cancel();
    }

    #[tokio::test]
    async fn test_racing_refetch_of_cancelled_request_fetches_once() {
        const CALLERS: usize = 16;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache: FunCache<String, usize> = FunCache::new("racing", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            ServerRequest::spawn("slow", |_| async {
                std::future::pending::<()>().await;
                Ok(0)
            })
        });

        let stale = cache.get(&"a".to_string());
        stale.cancel();

        let runtime = tokio::runtime::Handle::current();
        let barrier = Barrier::new(CALLERS);
        let handles: Vec<ServerRequest<usize>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..CALLERS)
                .map(|_| {
                    scope.spawn(|| {
                        let _runtime = runtime.enter();
                        barrier.wait();
                        cache.get_fresh(&"a".to_string())
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(handles.iter().all(|h| h.same_as(&handles[0])));
        assert!(!handles[0].same_as(&stale));
        assert!(cache.get(&"a".to_string()).same_as(&handles[0]));
        handles[0].cancel();
    }

    #[test]
    fn test_get_fresh_keeps_live_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(calls.clone());

        let first = cache.get_fresh(&"a".to_string());
        let second = cache.get_fresh(&"a".to_string());

        assert!(first.same_as(&second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
