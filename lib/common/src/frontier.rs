use crate::error::FrontierError;
use async_trait::async_trait;
use rdf_traversal_model::{Link, QueryContext};

/// The queue of discovered links that have not been visited yet.
///
/// A frontier is owned by a single traversal. The order in which links are popped, and whether a
/// pushed link is accepted at all, is up to the implementation.
pub trait LinkFrontier: Send {
    /// Adds `link` to the frontier. Returns `false` if the link was rejected.
    fn push(&mut self, link: Link) -> bool;

    /// Removes and returns the next link to visit.
    fn pop(&mut self) -> Option<Link>;

    /// Returns the next link to visit without removing it.
    fn peek(&self) -> Option<&Link>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Creates the frontier of a traversal.
#[async_trait]
pub trait LinkFrontierProvider: Send + Sync {
    async fn create(&self, context: &QueryContext)
        -> Result<Box<dyn LinkFrontier>, FrontierError>;
}
