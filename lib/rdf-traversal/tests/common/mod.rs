//! An in-memory web of documents that point to each other with `ex:next` statements.

use async_trait::async_trait;
use futures::{future, StreamExt, TryStreamExt};
use rdf_traversal::common::error::{
    AccumulateError, DereferenceError, DiscoveryError, IdentifyError, MetadataExtractError,
    QueryError,
};
use rdf_traversal::common::{
    AccumulateMode, BindingsStream, DereferenceOutput, Dereferencer, HandledDatasets, Headers,
    IdentifiedSource, LinkDiscoverer, MetadataAccumulator, MetadataExtractor, QuadStream,
    QuerySource, RecordStream, SourceIdentifier, Statements,
};
use rdf_traversal::engine::frontier::FifoLinkFrontierProvider;
use rdf_traversal::model::{
    match_quad, Bindings, Cardinality, GraphName, GraphNamePattern, Link, Literal, Metadata,
    MetadataCell, MetadataExtensions, NamedNode, NamedNodePattern, Quad, QuadPattern,
    QueryContext, QueryOperation, SelectorShape, Term, TermPattern, Variable,
};
use rdf_traversal::HypermediaCollaborators;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const NEXT: &str = "http://example.com/vocab#next";
const VALUE: &str = "http://example.com/vocab#value";
const BROKEN: &str = "http://example.com/vocab#broken";

pub fn url(name: &str) -> String {
    format!("http://example.com/{name}")
}

/// `?s ex:value ?o`
pub fn value_pattern() -> QueryOperation {
    QueryOperation::Pattern(QuadPattern {
        subject: TermPattern::Variable(Variable::new_unchecked("s")),
        predicate: NamedNodePattern::NamedNode(NamedNode::new_unchecked(VALUE)),
        object: TermPattern::Variable(Variable::new_unchecked("o")),
        graph_name: GraphNamePattern::DefaultGraph,
    })
}

/// The solution of [`value_pattern`] for the `index`-th value of a document.
pub fn value(name: &str, index: usize) -> Bindings {
    Bindings::new()
        .with(Variable::new_unchecked("s"), NamedNode::new_unchecked(url(name)))
        .with(
            Variable::new_unchecked("o"),
            Literal::new_simple_literal(format!("{name}-{index}")),
        )
}

/// Sorts solutions, as solutions of different documents arrive in any order.
pub fn sorted(mut solutions: Vec<Bindings>) -> Vec<Bindings> {
    solutions.sort_by_cached_key(|bindings| format!("{bindings:?}"));
    solutions
}

pub struct Document {
    name: String,
    quads: Vec<Quad>,
}

impl Document {
    pub fn new(name: &str, values: usize) -> Self {
        let subject = NamedNode::new_unchecked(url(name));
        let quads = (0..values)
            .map(|i| {
                Quad::new(
                    subject.clone(),
                    NamedNode::new_unchecked(VALUE),
                    Literal::new_simple_literal(format!("{name}-{i}")),
                    GraphName::DefaultGraph,
                )
            })
            .collect();
        Self {
            name: name.to_owned(),
            quads,
        }
    }

    pub fn link_to(mut self, names: &[&str]) -> Self {
        for name in names {
            let link = self.statement(NEXT, NamedNode::new_unchecked(url(name)));
            self.quads.push(link);
        }
        self
    }

    /// Makes the metadata extraction of this document fail.
    pub fn with_broken_metadata(mut self) -> Self {
        let broken = self.statement(BROKEN, Literal::new_simple_literal("true"));
        self.quads.push(broken);
        self
    }

    fn statement(&self, predicate: &str, object: impl Into<Term>) -> Quad {
        Quad::new(
            NamedNode::new_unchecked(url(&self.name)),
            NamedNode::new_unchecked(predicate),
            object,
            GraphName::DefaultGraph,
        )
    }
}

/// Serves documents by URL and counts how often each was dereferenced and identified.
#[derive(Default)]
pub struct Web {
    documents: HashMap<String, Vec<Quad>>,
    delay: Duration,
    dereferences: Mutex<HashMap<String, usize>>,
    identifications: AtomicUsize,
}

impl Web {
    pub fn new(documents: impl IntoIterator<Item = Document>) -> Self {
        Self {
            documents: documents
                .into_iter()
                .map(|document| (url(&document.name), document.quads))
                .collect(),
            ..Self::default()
        }
    }

    /// Three documents with three values each: p0 → p1 → p2.
    pub fn chain() -> Self {
        Self::new([
            Document::new("p0", 3).link_to(&["p1"]),
            Document::new("p1", 3).link_to(&["p2"]),
            Document::new("p2", 3),
        ])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn dereferences(&self, name: &str) -> usize {
        self.dereferences
            .lock()
            .unwrap()
            .get(&url(name))
            .copied()
            .unwrap_or(0)
    }

    pub fn identifications(&self) -> usize {
        self.identifications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dereferencer for Web {
    async fn dereference(
        &self,
        url: &str,
        _context: &QueryContext,
    ) -> Result<DereferenceOutput, DereferenceError> {
        *self
            .dereferences
            .lock()
            .unwrap()
            .entry(url.to_owned())
            .or_default() += 1;
        tokio::time::sleep(self.delay).await;

        let quads = self
            .documents
            .get(url)
            .ok_or_else(|| DereferenceError::new(url, "404 Not Found"))?;
        Ok(DereferenceOutput {
            data: futures::stream::iter(quads.clone().into_iter().map(Ok)).boxed(),
            url: url.to_owned(),
            headers: Headers::new(),
            request_time: self.delay,
        })
    }
}

#[async_trait]
impl SourceIdentifier for Web {
    async fn identify(
        &self,
        _url: &str,
        statements: Statements,
        metadata: &Metadata,
        _handled_datasets: &HandledDatasets,
        _context: &QueryContext,
    ) -> Result<IdentifiedSource, IdentifyError> {
        self.identifications.fetch_add(1, Ordering::SeqCst);
        Ok(IdentifiedSource {
            source: Arc::new(DocumentSource {
                statements,
                metadata: metadata.clone(),
            }),
            dataset: None,
        })
    }
}

/// Collects the objects of `ex:next` statements into the `next` extension field.
pub struct NextExtractor;

#[async_trait]
impl MetadataExtractor for NextExtractor {
    async fn extract(
        &self,
        url: &str,
        statements: &[Quad],
        _headers: &Headers,
        _request_time: Duration,
        _context: &QueryContext,
    ) -> Result<MetadataExtensions, MetadataExtractError> {
        if statements.iter().any(|quad| quad.predicate.as_str() == BROKEN) {
            return Err(MetadataExtractError::new(url, "malformed controls"));
        }

        let next = statements
            .iter()
            .filter(|quad| quad.predicate.as_str() == NEXT)
            .filter_map(|quad| match &quad.object {
                Term::NamedNode(node) => Some(node.as_str().to_owned()),
                _ => None,
            })
            .collect::<Vec<_>>();
        Ok(MetadataExtensions::from([("next".to_owned(), json!(next))]))
    }
}

/// Follows the URLs in the `next` extension field.
pub struct NextDiscoverer;

#[async_trait]
impl LinkDiscoverer for NextDiscoverer {
    async fn discover(
        &self,
        metadata: &Metadata,
        _context: &QueryContext,
    ) -> Result<Vec<Link>, DiscoveryError> {
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

/// Sums up cardinalities.
pub struct SummingAccumulator;

#[async_trait]
impl MetadataAccumulator for SummingAccumulator {
    async fn accumulate(
        &self,
        mode: AccumulateMode<'_>,
        _context: &QueryContext,
    ) -> Result<Metadata, AccumulateError> {
        Ok(match mode {
            AccumulateMode::Initialize => Metadata::default(),
            AccumulateMode::Append {
                accumulated,
                appending,
            } => Metadata::new(accumulated.cardinality.append(&appending.cardinality)),
        })
    }
}

/// A single document that answers pattern queries over its statements.
#[derive(Debug)]
pub struct DocumentSource {
    statements: Statements,
    metadata: Metadata,
}

#[async_trait]
impl QuerySource for DocumentSource {
    async fn selector_shape(&self, _context: &QueryContext) -> Result<SelectorShape, QueryError> {
        Ok(SelectorShape::Pattern)
    }

    fn query_bindings(
        &self,
        operation: &QueryOperation,
        _context: &QueryContext,
    ) -> BindingsStream {
        let Some(pattern) = operation.as_quad_pattern() else {
            return RecordStream::failed(QueryError::Unsupported("Joins".to_owned()));
        };
        let quads = match self.statements.quads() {
            Ok(quads) => quads,
            Err(error) => return RecordStream::failed(error),
        };

        let solutions = quads
            .iter()
            .filter_map(|quad| match_quad(&pattern, quad))
            .collect::<Vec<_>>();
        #[allow(clippy::cast_precision_loss, reason = "Test data is small")]
        let cardinality = Cardinality::exact(solutions.len() as f64);
        let cell = MetadataCell::new();
        cell.publish(Metadata::new(cardinality));
        RecordStream::new(
            futures::stream::iter(solutions.into_iter().map(Ok)),
            cell.watch(),
        )
    }

    fn query_quads(&self, operation: &QueryOperation, _context: &QueryContext) -> QuadStream {
        let pattern = operation.as_quad_pattern();
        self.statements
            .stream()
            .try_filter(move |quad| {
                future::ready(match &pattern {
                    Some(pattern) => match_quad(pattern, quad).is_some(),
                    None => true,
                })
            })
            .boxed()
    }

    /// Answered from the metadata alone.
    async fn query_boolean(
        &self,
        _operation: &QueryOperation,
        _context: &QueryContext,
    ) -> Result<bool, QueryError> {
        Ok(self.metadata.cardinality.value > 0.0)
    }

    async fn query_void(
        &self,
        _operation: &QueryOperation,
        _context: &QueryContext,
    ) -> Result<(), QueryError> {
        Err(QueryError::Unsupported("Updates".to_owned()))
    }
}

pub fn collaborators(web: &Arc<Web>) -> HypermediaCollaborators {
    HypermediaCollaborators {
        dereferencer: Arc::<Web>::clone(web),
        metadata_extractor: Arc::new(NextExtractor),
        accumulator: Arc::new(SummingAccumulator),
        identifier: Arc::<Web>::clone(web),
        discoverer: Arc::new(NextDiscoverer),
        frontier_provider: Arc::new(FifoLinkFrontierProvider),
    }
}
