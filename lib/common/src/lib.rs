//! Shared interfaces of RDF Traversal: errors, the collaborators a traversal is assembled from,
//! and the sources it queries.

mod collaborators;
mod config;
pub mod error;
mod frontier;
mod query_source;
mod source_state;

pub use collaborators::{
    AccumulateMode, DereferenceOutput, Dereferencer, Headers, IdentifiedSource, LinkDiscoverer,
    MetadataAccumulator, MetadataExtractor, SourceIdentifier,
};
pub use config::TraversalConfig;
pub use frontier::{LinkFrontier, LinkFrontierProvider};
pub use query_source::{BindingsStream, QuadStream, QuerySource, RecordStream};
pub use source_state::{HandledDatasets, SourceState, SourceStateResolver, Statements};
