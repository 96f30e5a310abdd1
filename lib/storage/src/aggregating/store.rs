use crate::aggregating::match_stream::{MatchShared, QuadMatchStream};
use rdf_traversal_common::RecordStream;
use rdf_traversal_model::{Metadata, Quad, QuadPattern};
use rustc_hash::FxHashSet;
use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::watch;
use tracing::debug;

/// Called whenever a match is opened on an [`AggregatingStore`].
pub type IteratorCreatedListener = Arc<dyn Fn() + Send + Sync>;

/// Identifies a registered [`IteratorCreatedListener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// An in-memory quad store that answers pattern matches while quads are still being imported.
///
/// Each match is a live stream: it first emits the matching quads already in the store, then the
/// matching quads imported later, and ends once the store has [ended](Self::end). Its metadata
/// property carries the number of quads matched so far as an estimate, on top of the store-wide
/// base metadata.
///
/// A store whose filling traversal stops early is [abandoned](Self::abandon) instead. Its open
/// matches then fail with [`QueryError::StoreAbandoned`], and the next
/// [`mark_started`](Self::mark_started) reopens it for another traversal.
///
/// [`QueryError::StoreAbandoned`]: rdf_traversal_common::error::QueryError::StoreAbandoned
///
/// Cloning the store is cheap and yields a handle to the same content.
#[derive(Clone)]
pub struct AggregatingStore {
    inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    pub(crate) content: RwLock<StoreContent>,
    /// Bumped on every change of the content.
    pub(crate) changes: watch::Sender<u64>,
    base_metadata: watch::Sender<Option<Arc<Metadata>>>,
    matches: Mutex<Vec<Weak<MatchShared>>>,
    pub(crate) running_matches: AtomicUsize,
    started: AtomicBool,
    listeners: Mutex<Vec<(ListenerId, IteratorCreatedListener)>>,
    next_listener_id: AtomicU64,
}

#[derive(Default)]
pub(crate) struct StoreContent {
    /// Quads in insertion order. Matches remember how far they have read.
    pub(crate) quads: Vec<Quad>,
    index: FxHashSet<Quad>,
    contained_sources: HashSet<String>,
    pub(crate) ended: bool,
    pub(crate) abandoned: bool,
}

impl StoreInner {
    pub(crate) fn base_metadata(&self) -> Option<Arc<Metadata>> {
        self.base_metadata.borrow().clone()
    }
}

impl AggregatingStore {
    /// Creates an empty store that accepts imports.
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        let (base_metadata, _) = watch::channel(None);
        Self {
            inner: Arc::new(StoreInner {
                content: RwLock::new(StoreContent::default()),
                changes,
                base_metadata,
                matches: Mutex::new(Vec::new()),
                running_matches: AtomicUsize::new(0),
                started: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    /// Adds `quads` to the store and returns how many of them were new.
    ///
    /// Once the store has ended, imports are ignored.
    pub fn import(&self, quads: &[Quad]) -> usize {
        let inserted = {
            let mut content = self.write_content();
            if content.ended {
                debug!("Ignoring import of {} quads into an ended store", quads.len());
                return 0;
            }

            let mut inserted = 0;
            for quad in quads {
                if content.index.insert(quad.clone()) {
                    content.quads.push(quad.clone());
                    inserted += 1;
                }
            }
            inserted
        };

        if inserted > 0 {
            self.inner.changes.send_modify(|version| *version += 1);
        }
        inserted
    }

    /// Records that the data of `source` is part of this store.
    ///
    /// Returns `false` if the source was already recorded.
    pub fn add_contained_source(&self, source: impl Into<String>) -> bool {
        self.write_content().contained_sources.insert(source.into())
    }

    pub fn contains_source(&self, source: &str) -> bool {
        self.read_content().contained_sources.contains(source)
    }

    /// Returns the sources whose data is part of this store.
    pub fn contained_sources(&self) -> HashSet<String> {
        self.read_content().contained_sources.clone()
    }

    /// Stops accepting imports. All open matches end once they have emitted what they found.
    pub fn end(&self) {
        {
            let mut content = self.write_content();
            if content.ended {
                return;
            }
            content.ended = true;
        }
        debug!("Aggregating store ended");
        self.inner.changes.send_modify(|version| *version += 1);
    }

    pub fn has_ended(&self) -> bool {
        self.read_content().ended
    }

    /// Gives up on completing the store. All open matches fail once they have emitted what they
    /// found.
    ///
    /// Imports are still accepted, so that resolutions still in flight are not lost for the
    /// traversal that reopens the store. Has no effect on an ended store.
    pub fn abandon(&self) {
        {
            let mut content = self.write_content();
            if content.ended || content.abandoned {
                return;
            }
            content.abandoned = true;
        }
        debug!("Aggregating store abandoned");
        self.inner.changes.send_modify(|version| *version += 1);
    }

    pub fn is_abandoned(&self) -> bool {
        self.read_content().abandoned
    }

    /// Marks the store as started. Returns `true` if it was not started before.
    ///
    /// An abandoned store is reopened first, keeping its content but not its base metadata.
    pub fn mark_started(&self) -> bool {
        let mut content = self.write_content();
        if content.abandoned {
            content.abandoned = false;
            self.inner.base_metadata.send_replace(None);
            self.inner.started.store(false, Ordering::Release);
            debug!("Reopening abandoned aggregating store");
        }
        !self.inner.started.swap(true, Ordering::AcqRel)
    }

    /// Whether a traversal is filling or has filled this store.
    pub fn is_started(&self) -> bool {
        let content = self.read_content();
        !content.abandoned && self.inner.started.load(Ordering::Acquire)
    }

    /// Returns the number of quads in the store.
    pub fn len(&self) -> usize {
        self.read_content().quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether some match stream is still open.
    pub fn has_running_matches(&self) -> bool {
        self.inner.running_matches.load(Ordering::Acquire) > 0
    }

    /// Returns the current store-wide base metadata.
    pub fn base_metadata(&self) -> Option<Arc<Metadata>> {
        self.inner.base_metadata()
    }

    /// Replaces the store-wide base metadata and refreshes the metadata of all open matches.
    pub fn set_base_metadata(&self, metadata: Metadata) {
        self.inner.base_metadata.send_replace(Some(Arc::new(metadata)));

        let matches = {
            let mut matches = self
                .inner
                .matches
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            matches.retain(|shared| shared.strong_count() > 0);
            matches.iter().filter_map(Weak::upgrade).collect::<Vec<_>>()
        };
        for shared in matches {
            shared.publish(&self.inner);
        }
    }

    /// Opens a live match for `pattern`.
    ///
    /// All registered iterator-created listeners are called before the stream is returned.
    pub fn match_pattern(&self, pattern: QuadPattern) -> RecordStream<Quad> {
        let shared = Arc::new(MatchShared::new());
        shared.publish(&self.inner);
        self.inner
            .matches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(&shared));

        let metadata = shared.watch();
        let stream = QuadMatchStream::new(Arc::clone(&self.inner), pattern, shared);
        self.notify_iterator_created();

        RecordStream::new(stream.into_stream(), metadata)
    }

    /// Registers `listener` to be called whenever a match is opened.
    pub fn add_iterator_created_listener(&self, listener: IteratorCreatedListener) -> ListenerId {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn remove_iterator_created_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Returns the number of registered iterator-created listeners.
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify_iterator_created(&self) {
        // Listeners may register or remove listeners themselves.
        let listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect::<Vec<_>>();
        for listener in listeners {
            listener();
        }
    }

    fn read_content(&self) -> std::sync::RwLockReadGuard<'_, StoreContent> {
        self.inner
            .content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_content(&self) -> std::sync::RwLockWriteGuard<'_, StoreContent> {
        self.inner
            .content
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AggregatingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for AggregatingStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let content = self.read_content();
        f.debug_struct("AggregatingStore")
            .field("len", &content.quads.len())
            .field("contained_sources", &content.contained_sources.len())
            .field("ended", &content.ended)
            .field("abandoned", &content.abandoned)
            .field("started", &self.inner.started.load(Ordering::Acquire))
            .finish()
    }
}
