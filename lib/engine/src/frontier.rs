//! Built-in [`LinkFrontier`] policies.

use async_trait::async_trait;
use rdf_traversal_common::error::FrontierError;
use rdf_traversal_common::{LinkFrontier, LinkFrontierProvider};
use rdf_traversal_model::{Link, QueryContext};
use std::collections::VecDeque;
use std::sync::Arc;

/// Visits links in the order in which they were discovered (breadth-first).
#[derive(Debug, Default)]
pub struct FifoLinkFrontier {
    links: VecDeque<Link>,
}

impl FifoLinkFrontier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinkFrontier for FifoLinkFrontier {
    fn push(&mut self, link: Link) -> bool {
        self.links.push_back(link);
        true
    }

    fn pop(&mut self) -> Option<Link> {
        self.links.pop_front()
    }

    fn peek(&self) -> Option<&Link> {
        self.links.front()
    }

    fn len(&self) -> usize {
        self.links.len()
    }
}

/// Visits the most recently discovered link first (depth-first).
#[derive(Debug, Default)]
pub struct LifoLinkFrontier {
    links: Vec<Link>,
}

impl LifoLinkFrontier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinkFrontier for LifoLinkFrontier {
    fn push(&mut self, link: Link) -> bool {
        self.links.push(link);
        true
    }

    fn pop(&mut self) -> Option<Link> {
        self.links.pop()
    }

    fn peek(&self) -> Option<&Link> {
        self.links.last()
    }

    fn len(&self) -> usize {
        self.links.len()
    }
}

/// Wraps another frontier and rejects all links after `limit` links have been accepted.
///
/// This bounds the number of documents a single traversal visits.
pub struct LimitCountLinkFrontier {
    inner: Box<dyn LinkFrontier>,
    remaining: usize,
}

impl LimitCountLinkFrontier {
    pub fn new(inner: Box<dyn LinkFrontier>, limit: usize) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }
}

impl LinkFrontier for LimitCountLinkFrontier {
    fn push(&mut self, link: Link) -> bool {
        if self.remaining == 0 {
            return false;
        }

        let accepted = self.inner.push(link);
        if accepted {
            self.remaining -= 1;
        }
        accepted
    }

    fn pop(&mut self) -> Option<Link> {
        self.inner.pop()
    }

    fn peek(&self) -> Option<&Link> {
        self.inner.peek()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Creates a [`FifoLinkFrontier`] for every traversal.
#[derive(Clone, Copy, Debug, Default)]
pub struct FifoLinkFrontierProvider;

#[async_trait]
impl LinkFrontierProvider for FifoLinkFrontierProvider {
    async fn create(
        &self,
        _context: &QueryContext,
    ) -> Result<Box<dyn LinkFrontier>, FrontierError> {
        Ok(Box::new(FifoLinkFrontier::new()))
    }
}

/// Creates a [`LifoLinkFrontier`] for every traversal.
#[derive(Clone, Copy, Debug, Default)]
pub struct LifoLinkFrontierProvider;

#[async_trait]
impl LinkFrontierProvider for LifoLinkFrontierProvider {
    async fn create(
        &self,
        _context: &QueryContext,
    ) -> Result<Box<dyn LinkFrontier>, FrontierError> {
        Ok(Box::new(LifoLinkFrontier::new()))
    }
}

/// Limits the frontiers created by another provider with a [`LimitCountLinkFrontier`].
#[derive(Clone)]
pub struct LimitCountLinkFrontierProvider {
    inner: Arc<dyn LinkFrontierProvider>,
    limit: usize,
}

impl LimitCountLinkFrontierProvider {
    pub fn new(inner: Arc<dyn LinkFrontierProvider>, limit: usize) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl LinkFrontierProvider for LimitCountLinkFrontierProvider {
    async fn create(
        &self,
        context: &QueryContext,
    ) -> Result<Box<dyn LinkFrontier>, FrontierError> {
        let inner = self.inner.create(context).await?;
        Ok(Box::new(LimitCountLinkFrontier::new(inner, self.limit)))
    }
}
