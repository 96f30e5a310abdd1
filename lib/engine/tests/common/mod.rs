//! An in-memory graph of pages, each with a few records and links to other pages.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use rdf_traversal_common::error::{
    AccumulateError, DereferenceError, DiscoveryError, IdentifyError, QueryError,
};
use rdf_traversal_common::{
    AccumulateMode, BindingsStream, HandledDatasets, LinkDiscoverer, MetadataAccumulator,
    QuadStream, QuerySource, RecordStream, SourceState, SourceStateResolver, TraversalConfig,
};
use rdf_traversal_engine::frontier::FifoLinkFrontierProvider;
use rdf_traversal_engine::{
    MediatedTraversalIterator, TraversalCollaborators, TraversalRequest,
};
use rdf_traversal_model::{
    Bindings, Cardinality, GraphNamePattern, Link, Literal, Metadata, MetadataCell,
    NamedNodePattern, QuadPattern, QueryContext, QueryOperation, SelectorShape, TermPattern,
    Variable,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn url(name: &str) -> String {
    format!("http://example.com/{name}")
}

pub fn record(page: &str, index: usize) -> Bindings {
    Bindings::new().with(
        Variable::new_unchecked("o"),
        Literal::new_simple_literal(format!("{page}-{index}")),
    )
}

pub fn operation() -> QueryOperation {
    QueryOperation::Pattern(QuadPattern {
        subject: TermPattern::Variable(Variable::new_unchecked("s")),
        predicate: NamedNodePattern::Variable(Variable::new_unchecked("p")),
        object: TermPattern::Variable(Variable::new_unchecked("o")),
        graph_name: GraphNamePattern::DefaultGraph,
    })
}

/// When a page publishes the metadata of its records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataTiming {
    /// Right away. The records end after the page delay.
    BeforeEnd,
    /// After the page delay. The records end right away.
    AfterEnd,
    /// Once the records have been read to the end.
    OnExhaustion,
}

#[derive(Clone, Debug)]
pub struct Page {
    name: String,
    records: Vec<Bindings>,
    next: Vec<String>,
    extensions: Vec<(String, Value)>,
    delay: Duration,
    timing: MetadataTiming,
    failing: bool,
}

impl Page {
    pub fn new(name: &str, records: usize) -> Self {
        Self {
            name: name.to_owned(),
            records: (0..records).map(|i| record(name, i)).collect(),
            next: Vec::new(),
            extensions: Vec::new(),
            delay: Duration::ZERO,
            timing: MetadataTiming::BeforeEnd,
            failing: false,
        }
    }

    pub fn link_to(mut self, names: &[&str]) -> Self {
        self.next.extend(names.iter().map(|name| url(name)));
        self
    }

    pub fn with_extension(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extensions.push((key.to_owned(), value.into()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timing(mut self, timing: MetadataTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Makes the records fail with a connection error after the last record.
    pub fn with_failing_records(mut self) -> Self {
        self.failing = true;
        self
    }
}

#[derive(Debug)]
pub struct PageSource {
    page: Page,
}

#[async_trait]
impl QuerySource for PageSource {
    async fn selector_shape(&self, _context: &QueryContext) -> Result<SelectorShape, QueryError> {
        Ok(SelectorShape::Pattern)
    }

    fn query_bindings(
        &self,
        _operation: &QueryOperation,
        _context: &QueryContext,
    ) -> BindingsStream {
        #[allow(clippy::cast_precision_loss, reason = "Test data is small")]
        let metadata = Metadata::new(Cardinality::exact(self.page.records.len() as f64));
        let cell = MetadataCell::new();
        let watch = cell.watch();
        let failure: Option<Result<Bindings, QueryError>> = self.page.failing.then(|| {
            Err(DereferenceError::new(url(&self.page.name), "connection reset").into())
        });
        let records = futures::stream::iter(
            self.page
                .records
                .clone()
                .into_iter()
                .map(Ok)
                .chain(failure),
        );
        let delay = self.page.delay;

        let records: BoxStream<'static, _> = match self.page.timing {
            MetadataTiming::BeforeEnd => {
                cell.publish(metadata);
                let end = futures::stream::once(async move {
                    tokio::time::sleep(delay).await;
                    drop(cell);
                })
                .filter_map(|()| async { None });
                records.chain(end).boxed()
            }
            MetadataTiming::AfterEnd => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    cell.publish(metadata);
                });
                records.boxed()
            }
            MetadataTiming::OnExhaustion => {
                let end = futures::stream::once(async move {
                    cell.publish(metadata);
                })
                .filter_map(|()| async { None });
                records.chain(end).boxed()
            }
        };
        RecordStream::new(records, watch)
    }

    fn query_quads(&self, _operation: &QueryOperation, _context: &QueryContext) -> QuadStream {
        futures::stream::empty().boxed()
    }

    async fn query_boolean(
        &self,
        _operation: &QueryOperation,
        _context: &QueryContext,
    ) -> Result<bool, QueryError> {
        Ok(!self.page.records.is_empty())
    }

    async fn query_void(
        &self,
        _operation: &QueryOperation,
        _context: &QueryContext,
    ) -> Result<(), QueryError> {
        Err(QueryError::Unsupported("Updates".to_owned()))
    }
}

/// Resolves pages by URL and counts how often each URL was resolved.
#[derive(Default)]
pub struct PageResolver {
    pages: HashMap<String, Page>,
    resolutions: Mutex<HashMap<String, usize>>,
    fatal: bool,
}

impl PageResolver {
    pub fn new(pages: impl IntoIterator<Item = Page>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|page| (url(&page.name), page))
                .collect(),
            ..Self::default()
        }
    }

    /// Every resolution fails with an error that is not transient.
    pub fn failing_fatally(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn resolutions(&self, name: &str) -> usize {
        self.resolutions
            .lock()
            .unwrap()
            .get(&url(name))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_resolutions(&self) -> usize {
        self.resolutions.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl SourceStateResolver for PageResolver {
    async fn resolve(
        &self,
        link: &Link,
        handled_datasets: &HandledDatasets,
        _context: &QueryContext,
    ) -> Result<SourceState, QueryError> {
        *self
            .resolutions
            .lock()
            .unwrap()
            .entry(link.url().to_owned())
            .or_default() += 1;

        if self.fatal {
            return Err(IdentifyError::new(link.url(), "unknown source type").into());
        }
        let Some(page) = self.pages.get(link.url()) else {
            return Err(DereferenceError::new(link.url(), "404 Not Found").into());
        };

        let mut metadata = Metadata::default().with_extension("next", json!(page.next));
        for (key, value) in &page.extensions {
            metadata = metadata.with_extension(key.clone(), value.clone());
        }
        Ok(SourceState {
            link: link.clone(),
            source: Arc::new(PageSource { page: page.clone() }),
            metadata,
            handled_datasets: handled_datasets.clone(),
        })
    }
}

/// Follows the URLs in the `next` extension field.
///
/// A `discovery` extension field of `dead-end` or `violation` makes discovery fail.
pub struct NextLinkDiscoverer;

#[async_trait]
impl LinkDiscoverer for NextLinkDiscoverer {
    async fn discover(
        &self,
        metadata: &Metadata,
        _context: &QueryContext,
    ) -> Result<Vec<Link>, DiscoveryError> {
        match metadata.extension("discovery").and_then(Value::as_str) {
            Some("dead-end") => return Err(DiscoveryError::dead_end("no controls found")),
            Some("violation") => return Err(DiscoveryError::protocol_violation("bad controls")),
            _ => {}
        }

        let links = metadata
            .extension("next")
            .and_then(Value::as_array)
            .map(|next| {
                next.iter()
                    .filter_map(Value::as_str)
                    .map(Link::new)
                    .collect()
            })
            .unwrap_or_default();
        Ok(links)
    }
}

/// Sums up cardinalities. Fails on every append once `fail` is set.
#[derive(Default)]
pub struct SummingAccumulator {
    pub fail: AtomicBool,
}

#[async_trait]
impl MetadataAccumulator for SummingAccumulator {
    async fn accumulate(
        &self,
        mode: AccumulateMode<'_>,
        _context: &QueryContext,
    ) -> Result<Metadata, AccumulateError> {
        match mode {
            AccumulateMode::Initialize => Ok(Metadata::default()),
            AccumulateMode::Append { .. } if self.fail.load(Ordering::SeqCst) => {
                Err(AccumulateError::new("cardinalities do not add up"))
            }
            AccumulateMode::Append {
                accumulated,
                appending,
            } => Ok(Metadata::new(
                accumulated.cardinality.append(&appending.cardinality),
            )),
        }
    }
}

pub fn collaborators(accumulator: Arc<SummingAccumulator>) -> TraversalCollaborators {
    TraversalCollaborators {
        discoverer: Arc::new(NextLinkDiscoverer),
        accumulator,
        frontier_provider: Arc::new(FifoLinkFrontierProvider),
    }
}

pub fn traverse(
    resolver: &Arc<PageResolver>,
    entry: &str,
    config: &TraversalConfig,
) -> MediatedTraversalIterator {
    traverse_with(resolver, entry, config, Arc::default())
}

pub fn traverse_with(
    resolver: &Arc<PageResolver>,
    entry: &str,
    config: &TraversalConfig,
    accumulator: Arc<SummingAccumulator>,
) -> MediatedTraversalIterator {
    let request = TraversalRequest::new(
        Link::new(url(entry)),
        operation(),
        QueryContext::new(),
        Arc::clone(resolver) as Arc<dyn SourceStateResolver>,
    );
    MediatedTraversalIterator::new(collaborators(accumulator), request, config)
}

/// Sorts records by their rendering, as records of different sources arrive in any order.
pub fn sorted(mut records: Vec<Bindings>) -> Vec<Bindings> {
    records.sort_by_cached_key(|bindings| format!("{bindings:?}"));
    records
}
