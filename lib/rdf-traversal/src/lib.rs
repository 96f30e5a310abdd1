//! Link-traversal query evaluation over hypermedia-linked RDF documents.
//!
//! A [`HypermediaQuerySource`] answers queries over all documents reachable from an entry-point
//! URL. Documents are fetched, described, and identified by pluggable collaborators (see
//! [`HypermediaCollaborators`]), and the links to follow are found in the metadata of each
//! visited document.
#![doc(test(attr(deny(warnings))))]

mod cache;
mod config;
mod source;

pub use config::HypermediaConfig;
pub use source::{HypermediaCollaborators, HypermediaQuerySource};

pub mod model {
    pub use rdf_traversal_model::*;
}

pub mod common {
    pub use rdf_traversal_common::*;
}

pub mod engine {
    pub use rdf_traversal_engine::*;
}

pub mod storage {
    pub use rdf_traversal_storage::*;
}
