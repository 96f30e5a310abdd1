//! The collaborators a traversal is assembled from.
//!
//! Each collaborator is a trait with a single operation. Fetching and parsing documents,
//! extracting and merging metadata, finding links, and identifying sources are all provided by
//! the caller.

use crate::error::{
    AccumulateError, DereferenceError, DiscoveryError, IdentifyError, MetadataExtractError,
};
use crate::query_source::{QuadStream, QuerySource};
use crate::source_state::{HandledDatasets, Statements};
use async_trait::async_trait;
use rdf_traversal_model::{Link, Metadata, MetadataExtensions, Quad, QueryContext};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Response headers of a dereferenced document.
pub type Headers = BTreeMap<String, String>;

/// A fetched and parsed document.
pub struct DereferenceOutput {
    /// The parsed statements.
    pub data: QuadStream,
    /// The URL after following redirects.
    pub url: String,
    pub headers: Headers,
    pub request_time: Duration,
}

/// Fetches a document and parses it into statements.
#[async_trait]
pub trait Dereferencer: Send + Sync {
    async fn dereference(
        &self,
        url: &str,
        context: &QueryContext,
    ) -> Result<DereferenceOutput, DereferenceError>;
}

/// Extracts metadata annotations (pagination controls, dataset descriptions...) from statements.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(
        &self,
        url: &str,
        statements: &[Quad],
        headers: &Headers,
        request_time: Duration,
        context: &QueryContext,
    ) -> Result<MetadataExtensions, MetadataExtractError>;
}

/// How a [`MetadataAccumulator`] is invoked.
#[derive(Clone, Copy, Debug)]
pub enum AccumulateMode<'a> {
    /// Produce the metadata of a source that nothing is known about yet.
    Initialize,
    /// Merge `appending` into `accumulated`.
    Append {
        accumulated: &'a Metadata,
        appending: &'a Metadata,
    },
}

/// Merges metadata records, e.g., by summing up their cardinalities.
#[async_trait]
pub trait MetadataAccumulator: Send + Sync {
    async fn accumulate(
        &self,
        mode: AccumulateMode<'_>,
        context: &QueryContext,
    ) -> Result<Metadata, AccumulateError>;
}

/// Finds the links to follow from the metadata of a source.
#[async_trait]
pub trait LinkDiscoverer: Send + Sync {
    async fn discover(
        &self,
        metadata: &Metadata,
        context: &QueryContext,
    ) -> Result<Vec<Link>, DiscoveryError>;
}

/// The result of identifying a source.
#[derive(Clone, Debug)]
pub struct IdentifiedSource {
    pub source: Arc<dyn QuerySource>,
    /// The dataset the document belongs to, if it describes one.
    pub dataset: Option<String>,
}

/// Determines which kind of queryable source a document represents.
#[async_trait]
pub trait SourceIdentifier: Send + Sync {
    async fn identify(
        &self,
        url: &str,
        statements: Statements,
        metadata: &Metadata,
        handled_datasets: &HandledDatasets,
        context: &QueryContext,
    ) -> Result<IdentifiedSource, IdentifyError>;
}
