use rdf_traversal_common::TraversalConfig;

/// Holds the configuration of a [`HypermediaQuerySource`](crate::HypermediaQuerySource).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HypermediaConfig {
    /// The configuration of every traversal started by the source.
    pub traversal: TraversalConfig,
    /// The number of resolved sources kept in the resolution cache.
    pub cache_size: usize,
    /// Whether the statements of all resolved documents are collected in an
    /// [`AggregatingStore`](rdf_traversal_storage::AggregatingStore) that later pattern queries
    /// are answered from.
    pub aggregate_store: bool,
}

impl Default for HypermediaConfig {
    fn default() -> Self {
        Self {
            traversal: TraversalConfig::default(),
            cache_size: 100,
            aggregate_store: false,
        }
    }
}

impl HypermediaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_traversal(mut self, traversal: TraversalConfig) -> Self {
        self.traversal = traversal;
        self
    }

    /// Sets the size of the resolution cache. Values below one are raised to one.
    #[must_use]
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size.max(1);
        self
    }

    #[must_use]
    pub fn with_aggregate_store(mut self, aggregate_store: bool) -> Self {
        self.aggregate_store = aggregate_store;
        self
    }
}
