use crate::error::QueryError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use rdf_traversal_model::{
    Bindings, MetadataCell, MetadataWatch, Quad, QueryContext, QueryOperation, SelectorShape,
};
use std::fmt::Debug;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A stream of quads.
pub type QuadStream = BoxStream<'static, Result<Quad, QueryError>>;

/// A stream of solutions with a live metadata property.
pub type BindingsStream = RecordStream<Bindings>;

/// A stream of records that carries a live [metadata](rdf_traversal_model::Metadata) property.
///
/// Producers must publish the metadata at the latest when the records are exhausted, or drop
/// the [`MetadataCell`] backing the property so that readers stop waiting for it. Dropping the
/// stream cancels the production of further records.
pub struct RecordStream<T> {
    records: BoxStream<'static, Result<T, QueryError>>,
    metadata: MetadataWatch,
}

impl<T: Send + 'static> RecordStream<T> {
    pub fn new(
        records: impl Stream<Item = Result<T, QueryError>> + Send + 'static,
        metadata: MetadataWatch,
    ) -> Self {
        Self {
            records: records.boxed(),
            metadata,
        }
    }

    /// Creates a stream that fails with `error` once it is polled. It never publishes metadata.
    pub fn failed(error: QueryError) -> Self {
        let metadata = MetadataCell::new().watch();
        Self::new(futures::stream::once(async move { Err(error) }), metadata)
    }

    /// Returns the metadata property of this stream.
    pub fn metadata(&self) -> &MetadataWatch {
        &self.metadata
    }

    pub fn into_parts(self) -> (BoxStream<'static, Result<T, QueryError>>, MetadataWatch) {
        (self.records, self.metadata)
    }
}

impl<T> Stream for RecordStream<T> {
    type Item = Result<T, QueryError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.records.poll_next_unpin(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

/// A source that can be queried, e.g., a single document or a SPARQL endpoint.
///
/// Sources are produced by a [`SourceIdentifier`](crate::SourceIdentifier) and queried by the
/// traversal, once per resolved link.
#[async_trait]
pub trait QuerySource: Debug + Send + Sync {
    /// Describes which operations this source evaluates by itself.
    async fn selector_shape(&self, context: &QueryContext) -> Result<SelectorShape, QueryError>;

    /// Evaluates `operation` and returns its solutions.
    fn query_bindings(&self, operation: &QueryOperation, context: &QueryContext)
        -> BindingsStream;

    /// Evaluates `operation` and returns the matching quads.
    fn query_quads(&self, operation: &QueryOperation, context: &QueryContext) -> QuadStream;

    /// Evaluates `operation` as an `ASK` query.
    async fn query_boolean(
        &self,
        operation: &QueryOperation,
        context: &QueryContext,
    ) -> Result<bool, QueryError>;

    /// Evaluates `operation` as an update.
    async fn query_void(
        &self,
        operation: &QueryOperation,
        context: &QueryContext,
    ) -> Result<(), QueryError>;
}
