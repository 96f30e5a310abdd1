use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use lru::LruCache;
use rdf_traversal_common::error::QueryError;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// A resolution that all requesters of the same key await together.
pub(crate) type SharedResolution<V> = Shared<BoxFuture<'static, Result<V, QueryError>>>;

/// A bounded cache of resolutions, keyed by URL, with least-recently-used eviction.
///
/// At most one resolution per key is in flight: requesters of a key that is being resolved get
/// the pending resolution. Once polled, a resolution runs in its own task and completes even if
/// every requester stops waiting for it.
///
/// A single key can be pinned. The pinned resolution lives outside the LRU and is never evicted.
pub(crate) struct ResolutionCache<V> {
    entries: Mutex<Entries<V>>,
}

struct Entries<V> {
    recent: LruCache<String, SharedResolution<V>>,
    pinned: Option<(String, SharedResolution<V>)>,
}

impl<V: Clone + Send + Sync + 'static> ResolutionCache<V> {
    /// Creates a cache holding up to `capacity` unpinned resolutions (at least one).
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                recent: LruCache::new(capacity),
                pinned: None,
            }),
        }
    }

    /// Returns the resolution of `key`. If none is cached, `resolve` is called to start one, which
    /// is pinned if `pin` is set.
    pub(crate) fn get_or_resolve<F>(
        &self,
        key: &str,
        pin: bool,
        resolve: impl FnOnce() -> F,
    ) -> SharedResolution<V>
    where
        F: Future<Output = Result<V, QueryError>> + Send + 'static,
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((pinned_key, resolution)) = &entries.pinned {
            if pinned_key == key {
                return resolution.clone();
            }
        }
        if let Some(resolution) = entries.recent.get(key) {
            return resolution.clone();
        }

        debug!(url = key, pin, "Caching new resolution");
        let task = resolve();
        let resolution = async move {
            tokio::spawn(task)
                .await
                .unwrap_or_else(|error| Err(QueryError::Task(error.to_string())))
        }
        .boxed()
        .shared();

        if pin {
            entries.pinned = Some((key.to_owned(), resolution.clone()));
        } else if let Some((evicted, _)) = entries.recent.push(key.to_owned(), resolution.clone())
        {
            debug!(url = evicted.as_str(), "Evicted resolution");
        }
        resolution
    }

    /// Returns the number of cached resolutions, including the pinned one.
    pub(crate) fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.recent.len() + usize::from(entries.pinned.is_some())
    }
}
