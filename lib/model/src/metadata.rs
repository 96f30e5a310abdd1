use oxrdf::Variable;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tokio::sync::watch;

/// Free-form metadata fields, e.g., pagination hints (`next`, `first`) or dataset descriptions.
pub type MetadataExtensions = BTreeMap<String, Value>;

/// A one-shot signal telling holders of a [`Metadata`] snapshot that it became stale.
///
/// Clones share the same signal. Once invalidated, a token never becomes valid again.
///
/// ```
/// use rdf_traversal_model::ValidationToken;
///
/// # tokio_test::block_on(async {
/// let token = ValidationToken::new();
/// let held = token.clone();
/// assert!(held.is_valid());
///
/// token.invalidate();
/// held.invalidated().await;
/// assert!(!held.is_valid());
/// # });
/// ```
#[derive(Clone)]
pub struct ValidationToken {
    invalidated: Arc<watch::Sender<bool>>,
}

impl ValidationToken {
    /// Creates a valid token.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            invalidated: Arc::new(sender),
        }
    }

    /// Marks the token as invalid and wakes everyone waiting in [`Self::invalidated`].
    pub fn invalidate(&self) {
        self.invalidated.send_replace(true);
    }

    pub fn is_valid(&self) -> bool {
        !*self.invalidated.borrow()
    }

    /// Completes once the token has been invalidated.
    pub async fn invalidated(&self) {
        let mut receiver = self.invalidated.subscribe();
        // The sender lives as long as `self`, so waiting cannot fail.
        receiver.wait_for(|invalidated| *invalidated).await.ok();
    }
}

impl Default for ValidationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ValidationToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationToken")
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Whether a [`Cardinality`] is known precisely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CardinalityType {
    Exact,
    Estimate,
}

/// The (expected) number of results of a query against a source.
///
/// Cardinalities are used for planning, never for correctness. The value is a float so that
/// unbounded estimates can be expressed as [`f64::INFINITY`].
#[derive(Clone, Debug, PartialEq)]
pub struct Cardinality {
    pub kind: CardinalityType,
    pub value: f64,
    /// The dataset this cardinality was computed for, if it spans a whole dataset.
    pub dataset: Option<String>,
}

impl Cardinality {
    pub fn exact(value: f64) -> Self {
        Self {
            kind: CardinalityType::Exact,
            value,
            dataset: None,
        }
    }

    pub fn estimate(value: f64) -> Self {
        Self {
            kind: CardinalityType::Estimate,
            value,
            dataset: None,
        }
    }

    #[must_use]
    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn is_exact(&self) -> bool {
        self.kind == CardinalityType::Exact
    }

    /// Returns the same value, marked as an estimate.
    #[must_use]
    pub fn as_estimate(&self) -> Self {
        Self {
            kind: CardinalityType::Estimate,
            ..self.clone()
        }
    }

    /// Combines the cardinality of two sources.
    ///
    /// Cardinalities describing the same dataset are not summed up, as the appended one only
    /// describes another view on data that is already accounted for.
    #[must_use]
    pub fn append(&self, other: &Cardinality) -> Self {
        if self.dataset.is_some() && self.dataset == other.dataset {
            return self.clone();
        }

        let kind = if self.is_exact() && other.is_exact() {
            CardinalityType::Exact
        } else {
            CardinalityType::Estimate
        };
        Self {
            kind,
            value: self.value + other.value,
            dataset: None,
        }
    }
}

/// A snapshot of what is known about the results of a query.
#[derive(Clone, Debug)]
pub struct Metadata {
    /// Invalidated as soon as a newer snapshot supersedes this one.
    pub state: ValidationToken,
    pub cardinality: Cardinality,
    pub can_contain_undefs: bool,
    pub variables: Option<Vec<Variable>>,
    pub extensions: MetadataExtensions,
}

impl Metadata {
    /// Creates a metadata snapshot with a fresh token and no extension fields.
    pub fn new(cardinality: Cardinality) -> Self {
        Self {
            state: ValidationToken::new(),
            cardinality,
            can_contain_undefs: false,
            variables: None,
            extensions: MetadataExtensions::new(),
        }
    }

    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Vec<Variable>) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Returns a copy of this snapshot carrying a new, valid token.
    #[must_use]
    pub fn refreshed(&self) -> Self {
        Self {
            state: ValidationToken::new(),
            ..self.clone()
        }
    }

    /// Returns `self` overlaid with `other`: the core fields are taken from `other` and the
    /// extension fields are united, `other` winning on conflicts.
    #[must_use]
    pub fn overlay(&self, other: &Metadata) -> Self {
        let mut extensions = self.extensions.clone();
        extensions.extend(
            other
                .extensions
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        Self {
            state: ValidationToken::new(),
            cardinality: other.cardinality.clone(),
            can_contain_undefs: other.can_contain_undefs,
            variables: other.variables.clone().or_else(|| self.variables.clone()),
            extensions,
        }
    }
}

impl Default for Metadata {
    /// An empty result: exactly zero results.
    fn default() -> Self {
        Self::new(Cardinality::exact(0.0))
    }
}

/// The single writer of a live metadata property.
///
/// Publishing a new snapshot invalidates the token of the previous one. Readers observe the
/// property through [`MetadataWatch`]es. Dropping the cell closes the property; watches keep the
/// last published snapshot.
#[derive(Debug)]
pub struct MetadataCell {
    sender: watch::Sender<Option<Arc<Metadata>>>,
}

impl MetadataCell {
    /// Creates a cell without a published snapshot.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// Replaces the current snapshot and invalidates the previous one.
    pub fn publish(&self, metadata: Metadata) -> Arc<Metadata> {
        let metadata = Arc::new(metadata);
        let previous = self.sender.send_replace(Some(Arc::clone(&metadata)));
        if let Some(previous) = previous {
            previous.state.invalidate();
        }
        metadata
    }

    pub fn current(&self) -> Option<Arc<Metadata>> {
        self.sender.borrow().clone()
    }

    /// Creates a new reader of this property.
    pub fn watch(&self) -> MetadataWatch {
        MetadataWatch {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for MetadataCell {
    fn default() -> Self {
        Self::new()
    }
}

/// A reader of a live metadata property.
#[derive(Clone, Debug)]
pub struct MetadataWatch {
    receiver: watch::Receiver<Option<Arc<Metadata>>>,
}

impl MetadataWatch {
    /// Creates a watch that holds `metadata` forever.
    pub fn fixed(metadata: Metadata) -> Self {
        let (_, receiver) = watch::channel(Some(Arc::new(metadata)));
        Self { receiver }
    }

    /// Returns the most recently published snapshot, if any.
    pub fn current(&self) -> Option<Arc<Metadata>> {
        self.receiver.borrow().clone()
    }

    /// Waits for the first published snapshot.
    ///
    /// Returns `None` if the writer went away without ever publishing.
    pub async fn first(&mut self) -> Option<Arc<Metadata>> {
        match self.receiver.wait_for(Option::is_some).await {
            Ok(metadata) => metadata.clone(),
            Err(_) => None,
        }
    }

    /// Waits for a snapshot that this watch has not yet seen.
    ///
    /// Returns `None` once the writer went away.
    pub async fn changed(&mut self) -> Option<Arc<Metadata>> {
        self.receiver.changed().await.ok()?;
        self.receiver.borrow_and_update().clone()
    }
}
