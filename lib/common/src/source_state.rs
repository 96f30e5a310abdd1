use crate::error::QueryError;
use crate::query_source::{QuadStream, QuerySource};
use async_trait::async_trait;
use futures::StreamExt;
use rdf_traversal_model::{Link, Metadata, Quad, QueryContext};
use std::collections::HashSet;
use std::sync::Arc;

/// Identifiers of the datasets that have already been claimed by a resolved source.
pub type HandledDatasets = HashSet<String>;

/// The statements of a dereferenced document.
///
/// If dereferencing failed, the failure is kept and only surfaced once somebody actually reads
/// the statements. This keeps a source usable for queries that never need its statements.
#[derive(Clone, Debug)]
pub enum Statements {
    Loaded(Arc<[Quad]>),
    Failed(QueryError),
}

impl Statements {
    pub fn loaded(quads: Vec<Quad>) -> Self {
        Statements::Loaded(quads.into())
    }

    pub fn failed(error: impl Into<QueryError>) -> Self {
        Statements::Failed(error.into())
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Statements::Loaded(_))
    }

    /// Returns the statements, or the deferred dereference error.
    pub fn quads(&self) -> Result<&[Quad], QueryError> {
        match self {
            Statements::Loaded(quads) => Ok(quads),
            Statements::Failed(error) => Err(error.clone()),
        }
    }

    /// Returns a stream over the statements. A deferred error is emitted on the first poll.
    pub fn stream(&self) -> QuadStream {
        match self {
            Statements::Loaded(quads) => {
                let quads = Arc::clone(quads);
                futures::stream::iter((0..quads.len()).map(move |i| Ok(quads[i].clone())))
                    .boxed()
            }
            Statements::Failed(error) => {
                let error = error.clone();
                futures::stream::once(async move { Err(error) }).boxed()
            }
        }
    }
}

/// A resolved [`Link`]: a queryable source plus what is known about it.
#[derive(Clone, Debug)]
pub struct SourceState {
    pub link: Link,
    pub source: Arc<dyn QuerySource>,
    /// The metadata extracted while resolving the source.
    pub metadata: Metadata,
    /// The datasets claimed by this source and all sources resolved before it.
    pub handled_datasets: HandledDatasets,
}

/// Turns links into [`SourceState`]s.
///
/// Implementations are free to cache, but must not resolve the same URL concurrently more than
/// once.
#[async_trait]
pub trait SourceStateResolver: Send + Sync {
    async fn resolve(
        &self,
        link: &Link,
        handled_datasets: &HandledDatasets,
        context: &QueryContext,
    ) -> Result<SourceState, QueryError>;
}
