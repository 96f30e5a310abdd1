//! Data model shared by the crates of RDF Traversal.
//!
//! Besides re-exporting the RDF and SPARQL algebra types from Oxigraph, this crate defines the
//! values that flow through a link traversal: [`Link`]s, [`Metadata`] snapshots with their
//! [`ValidationToken`], solution [`Bindings`], and the [`QueryOperation`] handed to sources.

mod bindings;
mod context;
mod link;
mod metadata;
mod operation;

pub use bindings::{match_quad, Bindings};
pub use context::QueryContext;
pub use link::{Link, LinkTransform};
pub use metadata::{
    Cardinality, CardinalityType, Metadata, MetadataCell, MetadataExtensions, MetadataWatch,
    ValidationToken,
};
pub use operation::{QueryOperation, SelectorShape};

// Re-export some oxrdf types.
pub use oxrdf::{
    BlankNode, BlankNodeRef, GraphName, GraphNameRef, Literal, LiteralRef, NamedNode,
    NamedNodeRef, Quad, QuadRef, Subject, SubjectRef, Term, TermRef, Variable, VariableRef,
};

// Re-export the parts of the SPARQL algebra that sources are queried with.
pub use spargebra::algebra::GraphPattern;
pub use spargebra::term::{
    GraphNamePattern, NamedNodePattern, QuadPattern, TermPattern, TriplePattern,
};
