use std::error::Error;
use std::sync::Arc;

type BoxedError = Box<dyn Error + Send + Sync + 'static>;

/// An error raised while fetching a document.
///
/// Dereference errors are isolated to the source they occurred for and never interrupt the
/// discovery of other sources.
#[derive(Debug, thiserror::Error)]
#[error("Failed to dereference '{url}': {source}")]
pub struct DereferenceError {
    url: String,
    source: BoxedError,
}

impl DereferenceError {
    pub fn new(url: impl Into<String>, error: impl Into<BoxedError>) -> Self {
        Self {
            url: url.into(),
            source: error.into(),
        }
    }

    /// The URL that could not be dereferenced.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// An error raised while extracting metadata from a document. Treated as empty metadata.
#[derive(Debug, thiserror::Error)]
#[error("Failed to extract metadata from '{url}': {source}")]
pub struct MetadataExtractError {
    url: String,
    source: BoxedError,
}

impl MetadataExtractError {
    pub fn new(url: impl Into<String>, error: impl Into<BoxedError>) -> Self {
        Self {
            url: url.into(),
            source: error.into(),
        }
    }
}

/// An error raised while combining metadata. Fatal for the traversal.
#[derive(Debug, thiserror::Error)]
#[error("Failed to accumulate metadata: {0}")]
pub struct AccumulateError(#[source] BoxedError);

impl AccumulateError {
    pub fn new(error: impl Into<BoxedError>) -> Self {
        Self(error.into())
    }
}

/// An error raised while discovering links.
///
/// Unless it is a protocol violation, the source is treated as a dead end.
#[derive(Debug, thiserror::Error)]
#[error("Failed to discover links: {source}")]
pub struct DiscoveryError {
    protocol_violation: bool,
    source: BoxedError,
}

impl DiscoveryError {
    /// A discovery failure after which the traversal can continue.
    pub fn dead_end(error: impl Into<BoxedError>) -> Self {
        Self {
            protocol_violation: false,
            source: error.into(),
        }
    }

    /// A discovery failure caused by a violated protocol. Fatal for the traversal.
    pub fn protocol_violation(error: impl Into<BoxedError>) -> Self {
        Self {
            protocol_violation: true,
            source: error.into(),
        }
    }

    pub fn is_protocol_violation(&self) -> bool {
        self.protocol_violation
    }
}

/// An error raised while identifying the kind of source a document represents. Fatal.
#[derive(Debug, thiserror::Error)]
#[error("Failed to identify source '{url}': {source}")]
pub struct IdentifyError {
    url: String,
    source: BoxedError,
}

impl IdentifyError {
    pub fn new(url: impl Into<String>, error: impl Into<BoxedError>) -> Self {
        Self {
            url: url.into(),
            source: error.into(),
        }
    }
}

/// An error raised while creating a link frontier. Fatal.
#[derive(Debug, thiserror::Error)]
#[error("Failed to create link frontier: {0}")]
pub struct FrontierError(#[source] BoxedError);

impl FrontierError {
    pub fn new(error: impl Into<BoxedError>) -> Self {
        Self(error.into())
    }
}

/// An error surfaced by the record streams of a query.
///
/// The error is cheap to clone, as the same failure may be observed by several consumers.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueryError {
    #[error(transparent)]
    Dereference(Arc<DereferenceError>),
    #[error(transparent)]
    Accumulate(Arc<AccumulateError>),
    #[error(transparent)]
    Discovery(Arc<DiscoveryError>),
    #[error(transparent)]
    Identify(Arc<IdentifyError>),
    #[error(transparent)]
    Frontier(Arc<FrontierError>),
    /// The source does not support the requested kind of query.
    #[error("{0} is not supported by this source")]
    Unsupported(String),
    /// A task of the traversal was cancelled or panicked.
    #[error("Traversal task failed: {0}")]
    Task(String),
    /// The traversal filling an aggregating store stopped before it visited every source.
    #[error("The aggregating store was abandoned before it was complete")]
    StoreAbandoned,
    #[error("{0}")]
    Other(#[source] Arc<dyn Error + Send + Sync + 'static>),
}

impl QueryError {
    /// Wraps an arbitrary error, e.g., one raised by a source implementation.
    pub fn other(error: impl Into<BoxedError>) -> Self {
        let error: BoxedError = error.into();
        Self::Other(Arc::from(error))
    }

    /// Whether the error only affects the source it was raised for.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueryError::Dereference(_))
    }
}

macro_rules! implement_from {
    ($error:ty, $variant:ident) => {
        impl From<$error> for QueryError {
            fn from(error: $error) -> Self {
                QueryError::$variant(Arc::new(error))
            }
        }
    };
}

implement_from!(DereferenceError, Dereference);
implement_from!(AccumulateError, Accumulate);
implement_from!(DiscoveryError, Discovery);
implement_from!(IdentifyError, Identify);
implement_from!(FrontierError, Frontier);
