use crate::aggregating::store::StoreInner;
use futures::Stream;
use rdf_traversal_common::error::QueryError;
use rdf_traversal_model::{
    match_quad, Cardinality, Metadata, MetadataCell, MetadataWatch, Quad, QuadPattern,
};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// State of an open match that the store needs to reach as well.
pub(crate) struct MatchShared {
    metadata: MetadataCell,
    /// The number of quads emitted so far. The lock also orders metadata updates.
    matched: Mutex<usize>,
}

impl MatchShared {
    pub(crate) fn new() -> Self {
        Self {
            metadata: MetadataCell::new(),
            matched: Mutex::new(0),
        }
    }

    pub(crate) fn watch(&self) -> MetadataWatch {
        self.metadata.watch()
    }

    /// Publishes the current metadata of the match.
    pub(crate) fn publish(&self, store: &StoreInner) {
        let matched = self.matched.lock().unwrap_or_else(PoisonError::into_inner);
        self.publish_locked(*matched, store);
    }

    fn record_match(&self, store: &StoreInner) {
        let mut matched = self.matched.lock().unwrap_or_else(PoisonError::into_inner);
        *matched += 1;
        self.publish_locked(*matched, store);
    }

    #[allow(clippy::cast_precision_loss, reason = "Cardinalities are estimates")]
    fn publish_locked(&self, matched: usize, store: &StoreInner) {
        let own = Metadata::new(Cardinality::estimate(matched as f64));
        let metadata = match store.base_metadata() {
            Some(base) => base.overlay(&own),
            None => own,
        };
        self.metadata.publish(metadata);
    }
}

/// Reads the matches for a pattern from a store that may still receive imports.
pub(crate) struct QuadMatchStream {
    store: Arc<StoreInner>,
    pattern: QuadPattern,
    /// Position in the insertion-ordered quads up to which the store has been scanned.
    cursor: usize,
    buffered: VecDeque<Quad>,
    changes: watch::Receiver<u64>,
    shared: Arc<MatchShared>,
    done: bool,
}

/// What a scan found out about the store.
#[derive(Clone, Copy, PartialEq, Eq)]
enum StoreStatus {
    Open,
    Ended,
    Abandoned,
}

impl QuadMatchStream {
    pub(crate) fn new(store: Arc<StoreInner>, pattern: QuadPattern, shared: Arc<MatchShared>) -> Self {
        store.running_matches.fetch_add(1, Ordering::AcqRel);
        let changes = store.changes.subscribe();
        Self {
            store,
            pattern,
            cursor: 0,
            buffered: VecDeque::new(),
            changes,
            shared,
            done: false,
        }
    }

    pub(crate) fn into_stream(self) -> impl Stream<Item = Result<Quad, QueryError>> + Send + 'static {
        futures::stream::unfold(self, |mut stream| async move {
            let quad = stream.next_quad().await?;
            Some((quad, stream))
        })
    }

    async fn next_quad(&mut self) -> Option<Result<Quad, QueryError>> {
        loop {
            if let Some(quad) = self.buffered.pop_front() {
                self.shared.record_match(&self.store);
                return Some(Ok(quad));
            }
            if self.done {
                return None;
            }

            // Mark the current version as seen before scanning, so that an import racing with
            // the scan wakes us up again.
            self.changes.borrow_and_update();
            let status = self.scan();
            if !self.buffered.is_empty() {
                continue;
            }
            match status {
                StoreStatus::Open => {}
                StoreStatus::Ended => return None,
                StoreStatus::Abandoned => {
                    self.done = true;
                    return Some(Err(QueryError::StoreAbandoned));
                }
            }

            if self.changes.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Buffers the matching quads imported since the last scan.
    fn scan(&mut self) -> StoreStatus {
        let content = self
            .store
            .content
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for quad in &content.quads[self.cursor..] {
            if match_quad(&self.pattern, quad).is_some() {
                self.buffered.push_back(quad.clone());
            }
        }
        self.cursor = content.quads.len();
        if content.ended {
            StoreStatus::Ended
        } else if content.abandoned {
            StoreStatus::Abandoned
        } else {
            StoreStatus::Open
        }
    }
}

impl Drop for QuadMatchStream {
    fn drop(&mut self) {
        self.store.running_matches.fetch_sub(1, Ordering::AcqRel);
    }
}
