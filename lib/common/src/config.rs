/// Holds the configuration of a link traversal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraversalConfig {
    /// The maximum number of sources that are resolved or queried at the same time.
    pub max_concurrent_sources: usize,
    /// The number of records that are buffered before sources are paused.
    ///
    /// Traversals that fill an aggregating store never pause their sources.
    pub buffer_size: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 64,
            buffer_size: 128,
        }
    }
}

impl TraversalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of concurrently handled sources. Values below one are raised to one.
    #[must_use]
    pub fn with_max_concurrent_sources(mut self, max_concurrent_sources: usize) -> Self {
        self.max_concurrent_sources = max_concurrent_sources.max(1);
        self
    }

    /// Sets the record buffer size. Values below one are raised to one.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }
}
