//! A store that aggregates the statements of all documents visited by a traversal.

mod match_stream;
mod store;

pub use store::{AggregatingStore, IteratorCreatedListener, ListenerId};
