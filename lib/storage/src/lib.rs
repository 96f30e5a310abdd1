#![doc(test(attr(deny(warnings))))]

//! Contains the storage layer of RDF Traversal.
//!
//! The [`AggregatingStore`] collects the statements of every document a traversal has visited, so
//! that later queries against the same entry point can be answered without traversing again.

mod aggregating;

pub use aggregating::{AggregatingStore, IteratorCreatedListener, ListenerId};
