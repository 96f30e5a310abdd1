//! The query source that external callers address: a single entry-point URL whose linked
//! documents are traversed on demand.
//!
//! Usage example:
//! ```
//! use rdf_traversal::{HypermediaCollaborators, HypermediaConfig, HypermediaQuerySource};
//!
//! fn open(collaborators: HypermediaCollaborators) -> HypermediaQuerySource {
//!     let config = HypermediaConfig::default()
//!         .with_cache_size(500)
//!         .with_aggregate_store(true);
//!     HypermediaQuerySource::new("http://example.com/data", collaborators, config)
//! }
//! # fn main() { let _ = open; }
//! ```

use crate::cache::ResolutionCache;
use crate::config::HypermediaConfig;
use async_trait::async_trait;
use futures::{future, StreamExt, TryStreamExt};
use rdf_traversal_common::error::{DereferenceError, QueryError};
use rdf_traversal_common::{
    AccumulateMode, BindingsStream, Dereferencer, HandledDatasets, Headers, LinkDiscoverer,
    LinkFrontierProvider, MetadataAccumulator, MetadataExtractor, QuadStream, QuerySource,
    RecordStream, SourceIdentifier, SourceState, SourceStateResolver, Statements,
};
use rdf_traversal_engine::{MediatedTraversalIterator, TraversalCollaborators, TraversalRequest};
use rdf_traversal_model::{
    match_quad, Link, MetadataExtensions, QuadPattern, QueryContext, QueryOperation,
    SelectorShape,
};
use rdf_traversal_storage::AggregatingStore;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The collaborators a [`HypermediaQuerySource`] resolves documents and traverses links with.
#[derive(Clone)]
pub struct HypermediaCollaborators {
    pub dereferencer: Arc<dyn Dereferencer>,
    pub metadata_extractor: Arc<dyn MetadataExtractor>,
    pub accumulator: Arc<dyn MetadataAccumulator>,
    pub identifier: Arc<dyn SourceIdentifier>,
    pub discoverer: Arc<dyn LinkDiscoverer>,
    pub frontier_provider: Arc<dyn LinkFrontierProvider>,
}

impl HypermediaCollaborators {
    fn traversal(&self) -> TraversalCollaborators {
        TraversalCollaborators {
            discoverer: Arc::clone(&self.discoverer),
            accumulator: Arc::clone(&self.accumulator),
            frontier_provider: Arc::clone(&self.frontier_provider),
        }
    }
}

/// A query source over the documents reachable from an entry-point URL.
///
/// Every query for solutions starts a [`MediatedTraversalIterator`] at the entry point, which
/// follows the links found in the metadata of each document. Resolved documents are cached by
/// URL and shared between all queries of this source.
///
/// If an aggregating store is enabled, the statements of every resolved document are also
/// imported into it. Once a traversal fills the store, single-pattern queries are answered from
/// the store instead of starting another traversal. The first traversal keeps filling the store
/// even if its own consumer is not reading, as soon as a store match is opened. If that traversal
/// is stopped before it visited every source, the store is abandoned and the next query traverses
/// again to complete it.
///
/// Quad, boolean, and update queries are answered by the entry-point document alone.
///
/// Cloning the source is cheap and yields a handle to the same cache and store.
#[derive(Clone)]
pub struct HypermediaQuerySource {
    inner: Arc<SourceInner>,
}

struct SourceInner {
    entry: String,
    collaborators: HypermediaCollaborators,
    config: HypermediaConfig,
    cache: ResolutionCache<SourceState>,
    store: Option<AggregatingStore>,
}

impl HypermediaQuerySource {
    pub fn new(
        entry: impl Into<String>,
        collaborators: HypermediaCollaborators,
        config: HypermediaConfig,
    ) -> Self {
        let store = config.aggregate_store.then(AggregatingStore::new);
        Self {
            inner: Arc::new(SourceInner {
                entry: entry.into(),
                collaborators,
                cache: ResolutionCache::new(config.cache_size),
                config,
                store,
            }),
        }
    }

    /// Returns the URL every traversal of this source starts at.
    pub fn entry_url(&self) -> &str {
        &self.inner.entry
    }

    pub fn config(&self) -> &HypermediaConfig {
        &self.inner.config
    }

    /// Returns the aggregating store, if enabled.
    pub fn aggregating_store(&self) -> Option<&AggregatingStore> {
        self.inner.store.as_ref()
    }

    /// Evaluates `operation` over all documents reachable from the entry point.
    ///
    /// The returned stream starts working once it is polled. Its metadata is the accumulated
    /// metadata of all queried documents.
    pub fn query(&self, operation: &QueryOperation, context: &QueryContext) -> BindingsStream {
        if let Some(store) = &self.inner.store {
            if store.is_started() {
                if let Some(pattern) = operation.as_quad_pattern() {
                    debug!(entry = self.entry_url(), "Answering pattern from aggregating store");
                    return store_bindings(store, pattern);
                }
            }
        }

        let resolver: Arc<dyn SourceStateResolver> = Arc::<SourceInner>::clone(&self.inner);
        let request = TraversalRequest::new(
            Link::new(self.inner.entry.clone()),
            operation.clone(),
            context.clone(),
            resolver,
        );

        // Only the traversal that starts the store fills it. An abandoned store is reopened here.
        let filling = self
            .inner
            .store
            .as_ref()
            .filter(|store| store.mark_started());
        let request = match filling {
            Some(store) => request.with_aggregating_store(store.clone()),
            None => request,
        };

        MediatedTraversalIterator::new(
            self.inner.collaborators.traversal(),
            request,
            &self.inner.config.traversal,
        )
        .into_bindings_stream()
    }

    /// Resolves `link`, sharing the resolution with all concurrent and later requests for the
    /// same URL until it is evicted from the cache.
    pub async fn resolve(
        &self,
        link: &Link,
        handled_datasets: &HandledDatasets,
        context: &QueryContext,
    ) -> Result<SourceState, QueryError> {
        self.inner.resolve(link, handled_datasets, context).await
    }

    async fn entry_source(&self, context: &QueryContext) -> Result<SourceState, QueryError> {
        self.resolve(
            &Link::new(self.inner.entry.clone()),
            &HandledDatasets::new(),
            context,
        )
        .await
    }
}

/// Matches `pattern` against the aggregating store and binds the matching quads.
fn store_bindings(store: &AggregatingStore, pattern: QuadPattern) -> BindingsStream {
    let (quads, metadata) = store.match_pattern(pattern.clone()).into_parts();
    let bindings = quads.try_filter_map(move |quad| future::ready(Ok(match_quad(&pattern, &quad))));
    RecordStream::new(bindings, metadata)
}

#[async_trait]
impl SourceStateResolver for SourceInner {
    async fn resolve(
        &self,
        link: &Link,
        handled_datasets: &HandledDatasets,
        context: &QueryContext,
    ) -> Result<SourceState, QueryError> {
        // The statements of other documents are retained by the store.
        let pin = self.store.is_some() && link.url() == self.entry;
        self.cache
            .get_or_resolve(link.url(), pin, || {
                Resolution {
                    collaborators: self.collaborators.clone(),
                    store: self.store.clone(),
                    link: link.clone(),
                    handled_datasets: handled_datasets.clone(),
                    context: context.clone(),
                }
                .run()
            })
            .await
    }
}

/// A single uncached resolution of a link.
struct Resolution {
    collaborators: HypermediaCollaborators,
    store: Option<AggregatingStore>,
    link: Link,
    handled_datasets: HandledDatasets,
    context: QueryContext,
}

impl Resolution {
    /// Dereferences the link, extracts and initializes its metadata, and identifies the source.
    ///
    /// A failed dereference does not fail the resolution. The source is identified with
    /// statements that surface the failure once they are read.
    async fn run(self) -> Result<SourceState, QueryError> {
        let Self {
            collaborators,
            store,
            link,
            mut handled_datasets,
            context,
        } = self;
        let context = match link.context() {
            Some(link_context) => context.merge(link_context),
            None => context,
        };

        let document = dereference(collaborators.dereferencer.as_ref(), &link, &context).await;

        let extensions = match document.statements.quads() {
            Ok(quads) => collaborators
                .metadata_extractor
                .extract(
                    &document.url,
                    quads,
                    &document.headers,
                    document.request_time,
                    &context,
                )
                .await
                .unwrap_or_else(|error| {
                    warn!(%error, "Ignoring metadata of source");
                    MetadataExtensions::new()
                }),
            Err(_) => MetadataExtensions::new(),
        };

        let mut metadata = collaborators
            .accumulator
            .accumulate(AccumulateMode::Initialize, &context)
            .await?;
        metadata.extensions.extend(extensions);

        let identified = collaborators
            .identifier
            .identify(
                &document.url,
                document.statements.clone(),
                &metadata,
                &handled_datasets,
                &context,
            )
            .await?;

        if let Some(dataset) = &identified.dataset {
            handled_datasets.insert(dataset.clone());
        }
        if let (Some(store), Ok(quads)) = (&store, document.statements.quads()) {
            let imported = store.import(quads);
            let contained = identified.dataset.unwrap_or_else(|| document.url.clone());
            store.add_contained_source(contained);
            debug!(url = document.url.as_str(), imported, "Imported statements into store");
        }

        debug!(url = link.url(), "Resolved source");
        Ok(SourceState {
            link,
            source: identified.source,
            metadata,
            handled_datasets,
        })
    }
}

struct Document {
    url: String,
    statements: Statements,
    headers: Headers,
    request_time: Duration,
}

/// Fetches the statements of `link`, keeping any failure inside the returned statements.
async fn dereference(
    dereferencer: &dyn Dereferencer,
    link: &Link,
    context: &QueryContext,
) -> Document {
    let output = match dereferencer.dereference(link.url(), context).await {
        Ok(output) => output,
        Err(error) => {
            warn!(%error, "Failed to dereference source");
            return Document {
                url: link.url().to_owned(),
                statements: Statements::failed(error),
                headers: Headers::new(),
                request_time: Duration::ZERO,
            };
        }
    };

    let statements = match output.data.try_collect::<Vec<_>>().await {
        Ok(quads) => Statements::loaded(match link.transform() {
            Some(transform) => transform(quads),
            None => quads,
        }),
        Err(error) => {
            warn!(url = output.url.as_str(), %error, "Failed to read statements of source");
            if error.is_transient() {
                Statements::Failed(error)
            } else {
                Statements::failed(DereferenceError::new(output.url.clone(), error))
            }
        }
    };
    Document {
        url: output.url,
        statements,
        headers: output.headers,
        request_time: output.request_time,
    }
}

#[async_trait]
impl QuerySource for HypermediaQuerySource {
    /// Returns the shape of the entry-point source.
    async fn selector_shape(&self, context: &QueryContext) -> Result<SelectorShape, QueryError> {
        self.entry_source(context)
            .await?
            .source
            .selector_shape(context)
            .await
    }

    fn query_bindings(
        &self,
        operation: &QueryOperation,
        context: &QueryContext,
    ) -> BindingsStream {
        self.query(operation, context)
    }

    fn query_quads(&self, operation: &QueryOperation, context: &QueryContext) -> QuadStream {
        let this = self.clone();
        let operation = operation.clone();
        let context = context.clone();
        futures::stream::once(async move {
            let entry = this.entry_source(&context).await?;
            Ok::<_, QueryError>(entry.source.query_quads(&operation, &context))
        })
        .try_flatten()
        .boxed()
    }

    async fn query_boolean(
        &self,
        operation: &QueryOperation,
        context: &QueryContext,
    ) -> Result<bool, QueryError> {
        self.entry_source(context)
            .await?
            .source
            .query_boolean(operation, context)
            .await
    }

    async fn query_void(
        &self,
        operation: &QueryOperation,
        context: &QueryContext,
    ) -> Result<(), QueryError> {
        self.entry_source(context)
            .await?
            .source
            .query_void(operation, context)
            .await
    }
}

impl Display for HypermediaQuerySource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "HypermediaQuerySource({})", self.inner.entry)
    }
}

impl Debug for HypermediaQuerySource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HypermediaQuerySource")
            .field("entry", &self.inner.entry)
            .field("config", &self.inner.config)
            .field("cached", &self.inner.cache.len())
            .field("store", &self.inner.store)
            .finish()
    }
}
