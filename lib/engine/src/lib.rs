#![doc(test(attr(deny(warnings))))]

//! The link-traversal engine of RDF Traversal.
//!
//! A [`TraversalIterator`] starts at an entry link, resolves every source it can reach through
//! the links discovered in the metadata of the sources it already visited, and merges their
//! records into a single stream. How links are found and how metadata is combined is defined by
//! a [`LinkTraversal`]; [`MediatedTraversalIterator`] implements it with collaborators.

pub mod frontier;
mod mediated;
mod traversal;

pub use mediated::{MediatedTraversal, MediatedTraversalIterator, TraversalCollaborators};
pub use traversal::{
    LinkTraversal, TraversalHandle, TraversalIterator, TraversalRequest, TraversalState,
    TraversalStatus,
};
