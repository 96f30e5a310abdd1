//! The concurrency-bounded link traversal that merges the records of many sources into one
//! stream.

mod driver;
mod iterator;
mod records;
mod source_task;

pub use iterator::{TraversalHandle, TraversalIterator};

use async_trait::async_trait;
use rdf_traversal_common::error::{AccumulateError, DiscoveryError, FrontierError, QueryError};
use rdf_traversal_common::{LinkFrontier, SourceStateResolver};
use rdf_traversal_model::{Link, Metadata, QueryContext, QueryOperation};
use rdf_traversal_storage::AggregatingStore;
use std::sync::Arc;

/// The hooks a [`TraversalIterator`] is specialized with.
///
/// All hooks of one traversal are called from a single task, one at a time.
#[async_trait]
pub trait LinkTraversal: Send + Sync + 'static {
    /// Creates the frontier of the traversal. Called once, when the traversal starts.
    async fn frontier(&self, context: &QueryContext)
        -> Result<Box<dyn LinkFrontier>, FrontierError>;

    /// Merges the metadata reported by another source into the accumulated metadata.
    async fn accumulate(
        &self,
        accumulated: &Metadata,
        appending: &Metadata,
        context: &QueryContext,
    ) -> Result<Metadata, AccumulateError>;

    /// Returns the links to visit next, given the metadata of a source.
    async fn discover(
        &self,
        metadata: &Metadata,
        context: &QueryContext,
    ) -> Result<Vec<Link>, DiscoveryError>;

    /// Whether the traversal may end in the given situation.
    ///
    /// `forced` is set once the consumer has asked to close the traversal.
    fn is_closeable(&self, status: &TraversalStatus, _forced: bool) -> bool {
        status.frontier_len == 0 && status.active_sources() == 0
    }
}

/// The lifecycle of a traversal.
#[derive(Clone, Debug, Default)]
pub enum TraversalState {
    /// Nothing has been requested yet.
    #[default]
    Cold,
    Running,
    /// The consumer asked to close the traversal; running sources are allowed to finish.
    Closing,
    Ended,
    Errored(QueryError),
}

impl TraversalState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TraversalState::Ended | TraversalState::Errored(_))
    }
}

/// A snapshot of the slot accounting of a traversal.
///
/// A slot is taken when a link is popped from the frontier and only given back once the source
/// has both ended and had its metadata handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraversalStatus {
    /// Sources that have been resolved and are still producing records.
    pub running: usize,
    /// Slots reserved for links that are still being resolved.
    pub pending_creation: usize,
    /// Sources that ended, but whose metadata has not been handled yet.
    pub pending_termination: usize,
    /// Links waiting in the frontier.
    pub frontier_len: usize,
    /// The highest number of slots in use at the same time.
    pub peak_slots: usize,
}

impl TraversalStatus {
    /// The number of slots in use.
    pub fn active_sources(&self) -> usize {
        self.running + self.pending_creation + self.pending_termination
    }
}

/// What a traversal evaluates, and where it starts.
#[derive(Clone)]
pub struct TraversalRequest {
    pub entry: Link,
    pub operation: QueryOperation,
    pub context: QueryContext,
    pub resolver: Arc<dyn SourceStateResolver>,
    /// A store filled alongside the traversal.
    ///
    /// Opening a match on the store kickstarts the traversal, which then runs regardless of its
    /// own consumer. The store receives the accumulated metadata, and is ended once every source
    /// has been visited or abandoned if the traversal stops before that.
    pub aggregating_store: Option<AggregatingStore>,
}

impl TraversalRequest {
    pub fn new(
        entry: Link,
        operation: QueryOperation,
        context: QueryContext,
        resolver: Arc<dyn SourceStateResolver>,
    ) -> Self {
        Self {
            entry,
            operation,
            context,
            resolver,
            aggregating_store: None,
        }
    }

    #[must_use]
    pub fn with_aggregating_store(mut self, store: AggregatingStore) -> Self {
        self.aggregating_store = Some(store);
        self
    }
}
