use crate::QueryContext;
use oxrdf::Quad;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Rewrites the statements of a dereferenced document before they are handed to the source.
///
/// Transforms operate on fully-dereferenced statements. They are attached to a [`Link`] by the
/// discoverer that found it, for example to re-graph the statements of a paginated view.
pub type LinkTransform = Arc<dyn Fn(Vec<Quad>) -> Vec<Quad> + Send + Sync>;

/// A resource to visit during a traversal.
///
/// Within one traversal, a link is identified by its URL.
#[derive(Clone)]
pub struct Link {
    url: String,
    context: Option<QueryContext>,
    transform: Option<LinkTransform>,
}

impl Link {
    /// Creates a link to `url` without context override or transform.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            context: None,
            transform: None,
        }
    }

    /// Returns a copy of this link that dereferences with `context` merged over the query context.
    #[must_use]
    pub fn with_context(mut self, context: QueryContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Returns a copy of this link that applies `transform` to the dereferenced statements.
    #[must_use]
    pub fn with_transform(mut self, transform: LinkTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn context(&self) -> Option<&QueryContext> {
        self.context.as_ref()
    }

    pub fn transform(&self) -> Option<&LinkTransform> {
        self.transform.as_ref()
    }
}

impl Debug for Link {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("url", &self.url)
            .field("context", &self.context)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Link {}

impl From<&str> for Link {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for Link {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}
