use crate::traversal::{
    LinkTraversal, TraversalHandle, TraversalIterator, TraversalRequest, TraversalState,
    TraversalStatus,
};
use async_trait::async_trait;
use futures::Stream;
use rdf_traversal_common::error::{AccumulateError, DiscoveryError, FrontierError, QueryError};
use rdf_traversal_common::{
    AccumulateMode, BindingsStream, LinkDiscoverer, LinkFrontier, LinkFrontierProvider,
    MetadataAccumulator, TraversalConfig,
};
use rdf_traversal_model::{Bindings, Link, Metadata, MetadataWatch, QueryContext};
use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

/// The collaborators a [`MediatedTraversalIterator`] delegates to.
#[derive(Clone)]
pub struct TraversalCollaborators {
    pub discoverer: Arc<dyn LinkDiscoverer>,
    pub accumulator: Arc<dyn MetadataAccumulator>,
    pub frontier_provider: Arc<dyn LinkFrontierProvider>,
}

/// A [`LinkTraversal`] backed by collaborators, which never visits a URL twice.
pub struct MediatedTraversal {
    collaborators: TraversalCollaborators,
    /// The URLs that have been queued by this traversal, including the entry URL.
    handled_urls: Mutex<HashSet<String>>,
}

impl MediatedTraversal {
    pub fn new(collaborators: TraversalCollaborators, entry: &Link) -> Self {
        Self {
            collaborators,
            handled_urls: Mutex::new(HashSet::from([entry.url().to_owned()])),
        }
    }

    /// Whether `url` has been queued by this traversal.
    pub fn is_handled(&self, url: &str) -> bool {
        self.handled_urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url)
    }
}

#[async_trait]
impl LinkTraversal for MediatedTraversal {
    async fn frontier(
        &self,
        context: &QueryContext,
    ) -> Result<Box<dyn LinkFrontier>, FrontierError> {
        self.collaborators.frontier_provider.create(context).await
    }

    async fn accumulate(
        &self,
        accumulated: &Metadata,
        appending: &Metadata,
        context: &QueryContext,
    ) -> Result<Metadata, AccumulateError> {
        self.collaborators
            .accumulator
            .accumulate(
                AccumulateMode::Append {
                    accumulated,
                    appending,
                },
                context,
            )
            .await
    }

    async fn discover(
        &self,
        metadata: &Metadata,
        context: &QueryContext,
    ) -> Result<Vec<Link>, DiscoveryError> {
        let links = self.collaborators.discoverer.discover(metadata, context).await?;
        let mut handled_urls = self
            .handled_urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(links
            .into_iter()
            .filter(|link| handled_urls.insert(link.url().to_owned()))
            .collect())
    }

    fn is_closeable(&self, status: &TraversalStatus, forced: bool) -> bool {
        (forced || status.frontier_len == 0) && status.active_sources() == 0
    }
}

/// A traversal whose links are found by a [`LinkDiscoverer`] and whose metadata is merged by a
/// [`MetadataAccumulator`].
///
/// Every URL is visited at most once per traversal, and the entry URL is never queued again. A
/// [closed](Self::close) traversal stops popping links and ends once its running sources are
/// done, even if links remain queued.
pub struct MediatedTraversalIterator {
    inner: TraversalIterator<MediatedTraversal>,
}

impl MediatedTraversalIterator {
    pub fn new(
        collaborators: TraversalCollaborators,
        request: TraversalRequest,
        config: &TraversalConfig,
    ) -> Self {
        let traversal = MediatedTraversal::new(collaborators, &request.entry);
        Self {
            inner: TraversalIterator::new(traversal, request, config),
        }
    }

    pub fn kickstart(&self) {
        self.inner.kickstart();
    }

    pub async fn metadata(&self) -> Result<Arc<Metadata>, QueryError> {
        self.inner.metadata().await
    }

    pub fn metadata_watch(&self) -> MetadataWatch {
        self.inner.metadata_watch()
    }

    pub fn close(&self) {
        self.inner.close();
    }

    pub fn destroy(&self, error: Option<QueryError>) {
        self.inner.destroy(error);
    }

    pub fn status(&self) -> TraversalStatus {
        self.inner.status()
    }

    pub fn state(&self) -> TraversalState {
        self.inner.state()
    }

    /// Whether `url` has been queued by this traversal.
    pub fn is_handled(&self, url: &str) -> bool {
        self.inner.traversal().is_handled(url)
    }

    pub fn handle(&self) -> TraversalHandle<MediatedTraversal> {
        self.inner.handle()
    }

    pub fn into_bindings_stream(self) -> BindingsStream {
        self.inner.into_bindings_stream()
    }
}

impl Stream for MediatedTraversalIterator {
    type Item = Result<Bindings, QueryError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Debug for MediatedTraversalIterator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MediatedTraversalIterator")
            .field(&self.inner)
            .finish()
    }
}
