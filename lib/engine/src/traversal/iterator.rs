use crate::traversal::driver::drive;
use crate::traversal::records::{self, RecordReceiver, RecordSender};
use crate::traversal::{LinkTraversal, TraversalRequest, TraversalState, TraversalStatus};
use futures::future::{BoxFuture, Shared};
use futures::{FutureExt, Stream, StreamExt};
use rdf_traversal_common::error::QueryError;
use rdf_traversal_common::{
    BindingsStream, HandledDatasets, RecordStream, SourceStateResolver, TraversalConfig,
};
use rdf_traversal_model::{
    Bindings, Link, Metadata, MetadataCell, MetadataWatch, QueryContext, QueryOperation,
};
use rdf_traversal_storage::{AggregatingStore, ListenerId};
use std::fmt::{Debug, Formatter};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::task::{ready, Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

type Preflight = Shared<BoxFuture<'static, Result<Arc<Metadata>, QueryError>>>;

/// The part of a traversal request that every source is queried with.
pub(crate) struct SubQuery {
    pub(crate) resolver: Arc<dyn SourceStateResolver>,
    pub(crate) operation: QueryOperation,
    pub(crate) context: QueryContext,
}

struct Launch {
    /// Handed to the driver when the traversal starts.
    records: Option<RecordSender>,
    driver: Option<JoinHandle<()>>,
}

/// State shared between a [`TraversalIterator`], its handles, and its driver task.
pub(crate) struct TraversalCore<T> {
    pub(crate) traversal: T,
    pub(crate) entry: Link,
    pub(crate) query: Arc<SubQuery>,
    pub(crate) config: TraversalConfig,
    pub(crate) store: Option<AggregatingStore>,
    /// Kickstarts the traversal when a match is opened on the store.
    store_listener: OnceLock<ListenerId>,
    pub(crate) metadata: MetadataCell,
    pub(crate) status: watch::Sender<TraversalStatus>,
    pub(crate) state: watch::Sender<TraversalState>,
    launch: Mutex<Launch>,
    preflight: Mutex<Option<Preflight>>,
    destroyed: AtomicBool,
}

impl<T: LinkTraversal> TraversalCore<T> {
    fn is_cold(&self) -> bool {
        matches!(*self.state.borrow(), TraversalState::Cold)
    }

    fn error(&self) -> Option<QueryError> {
        match &*self.state.borrow() {
            TraversalState::Errored(error) => Some(error.clone()),
            _ => None,
        }
    }

    fn lock_launch(&self) -> MutexGuard<'_, Launch> {
        self.launch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the driver, unless the traversal has already been started or finished.
    fn start(self: &Arc<Self>) {
        if !self.is_cold() {
            return;
        }

        let mut launch = self.lock_launch();
        let Some(records) = launch.records.take() else {
            return;
        };
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(error) => {
                self.finish(&mut launch, Some(QueryError::Task(error.to_string())), false);
                return;
            }
        };

        let started = self.state.send_if_modified(|state| {
            if !matches!(state, TraversalState::Cold) {
                return false;
            }
            *state = TraversalState::Running;
            true
        });
        if started {
            debug!(entry = self.entry.url(), "Starting traversal");
            launch.driver = Some(runtime.spawn(drive(Arc::clone(self), records)));
        }
    }

    /// `exhausted` is set if every source reachable under the traversal's policy was visited.
    fn finish(&self, launch: &mut Launch, error: Option<QueryError>, exhausted: bool) -> bool {
        let complete = exhausted && error.is_none();
        let finished = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = match error {
                Some(error) => TraversalState::Errored(error),
                None => TraversalState::Ended,
            };
            true
        });

        if finished {
            launch.records = None;
            if let Some(store) = &self.store {
                if let Some(listener) = self.store_listener.get() {
                    store.remove_iterator_created_listener(*listener);
                }
                if complete {
                    store.end();
                } else {
                    store.abandon();
                }
            }
        }
        finished
    }

    /// Moves the traversal into a terminal state. Has no effect if it already is in one.
    pub(crate) fn complete(&self, error: Option<QueryError>, exhausted: bool) {
        let mut launch = self.lock_launch();
        self.finish(&mut launch, error, exhausted);
    }

    fn close(&self) {
        let mut launch = self.lock_launch();
        if self.is_cold() {
            self.finish(&mut launch, None, false);
            return;
        }
        self.state.send_if_modified(|state| {
            if !matches!(state, TraversalState::Running) {
                return false;
            }
            *state = TraversalState::Closing;
            true
        });
    }

    fn destroy(&self, error: Option<QueryError>) {
        self.destroyed.store(true, Ordering::Release);
        let driver = {
            let mut launch = self.lock_launch();
            self.finish(&mut launch, error, false);
            launch.driver.take()
        };
        // Aborting the driver drops its task set, which aborts every running source.
        if let Some(driver) = driver {
            driver.abort();
        }
    }

    fn preflight(&self) -> Preflight {
        let mut preflight = self.preflight.lock().unwrap_or_else(PoisonError::into_inner);
        preflight
            .get_or_insert_with(|| {
                let query = Arc::clone(&self.query);
                let entry = self.entry.clone();
                async move {
                    let state = query
                        .resolver
                        .resolve(&entry, &HandledDatasets::new(), &query.context)
                        .await?;
                    let (mut records, mut watch) = state
                        .source
                        .query_bindings(&query.operation, &query.context)
                        .into_parts();
                    // Sources may only publish metadata once their records have been read.
                    let reported = tokio::select! {
                        reported = watch.first() => Some(reported),
                        () = async { while records.next().await.is_some() {} } => None,
                    };
                    let reported = match reported {
                        Some(reported) => reported,
                        None => {
                            drop(records);
                            watch.first().await
                        }
                    };

                    Ok(Arc::new(match reported {
                        Some(reported) => state.metadata.overlay(&reported),
                        None => state.metadata,
                    }))
                }
                .boxed()
                .shared()
            })
            .clone()
    }

    fn publish_preflight(&self, metadata: Arc<Metadata>) -> Arc<Metadata> {
        // The driver only publishes after the traversal left the cold state under this lock.
        let _launch = self.lock_launch();
        if let Some(current) = self.metadata.current() {
            return current;
        }
        if self.is_cold() {
            self.metadata.publish(metadata.refreshed())
        } else {
            metadata
        }
    }

    async fn metadata(&self) -> Result<Arc<Metadata>, QueryError> {
        if let Some(metadata) = self.metadata.current() {
            return Ok(metadata);
        }

        if self.is_cold() {
            let metadata = self.preflight().await?;
            return Ok(self.publish_preflight(metadata));
        }

        let mut watch = self.metadata.watch();
        let mut state = self.state.subscribe();
        tokio::select! {
            Some(metadata) = watch.first() => Ok(metadata),
            () = async { state.wait_for(TraversalState::is_terminal).await.ok(); } => {
                match (self.metadata.current(), self.error()) {
                    (Some(metadata), _) => Ok(metadata),
                    (None, Some(error)) => Err(error),
                    (None, None) => Ok(Arc::new(Metadata::default())),
                }
            }
        }
    }
}

/// Merges the records of all sources reachable from an entry link into a single stream.
///
/// The traversal starts lazily, on the first poll or on [`kickstart`](Self::kickstart). A single
/// driver task then pops links from the frontier, resolves and queries them with at most
/// [`max_concurrent_sources`](TraversalConfig::max_concurrent_sources) sources at a time, and
/// accumulates the metadata they report. Records of one source keep their order; records of
/// different sources are interleaved arbitrarily.
///
/// Dropping the iterator destroys the traversal.
pub struct TraversalIterator<T: LinkTraversal> {
    core: Arc<TraversalCore<T>>,
    records: RecordReceiver,
    done: bool,
}

impl<T: LinkTraversal> TraversalIterator<T> {
    /// Creates a cold traversal. Nothing is resolved before the iterator is polled or kickstarted.
    ///
    /// A traversal that fills an aggregating store buffers its records without bound, so that it
    /// can proceed without a reader.
    pub fn new(traversal: T, request: TraversalRequest, config: &TraversalConfig) -> Self {
        let bound = request
            .aggregating_store
            .is_none()
            .then_some(config.buffer_size);
        let (sender, records) = records::channel(bound);
        let (status, _) = watch::channel(TraversalStatus::default());
        let (state, _) = watch::channel(TraversalState::Cold);
        let TraversalRequest {
            entry,
            operation,
            context,
            resolver,
            aggregating_store,
        } = request;

        let core = TraversalCore {
            traversal,
            entry,
            query: Arc::new(SubQuery {
                resolver,
                operation,
                context,
            }),
            config: config.clone(),
            store: aggregating_store,
            store_listener: OnceLock::new(),
            metadata: MetadataCell::new(),
            status,
            state,
            launch: Mutex::new(Launch {
                records: Some(sender),
                driver: None,
            }),
            preflight: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        };
        let core = Arc::new(core);
        if let Some(store) = &core.store {
            let handle = TraversalHandle {
                core: Arc::downgrade(&core),
            };
            let listener =
                store.add_iterator_created_listener(Arc::new(move || handle.kickstart()));
            core.store_listener.set(listener).ok();
        }
        Self {
            core,
            records,
            done: false,
        }
    }

    /// Starts the traversal without waiting for the first poll. Idempotent.
    pub fn kickstart(&self) {
        self.core.start();
    }

    /// Returns the current metadata of the traversal.
    ///
    /// If the traversal has not started yet, only the entry source is resolved and queried for
    /// its metadata; the traversal itself stays cold. Concurrent calls share that request.
    pub async fn metadata(&self) -> Result<Arc<Metadata>, QueryError> {
        self.core.metadata().await
    }

    /// Returns a reader of the live metadata property.
    pub fn metadata_watch(&self) -> MetadataWatch {
        self.core.metadata.watch()
    }

    /// Ends the traversal gracefully.
    ///
    /// A cold traversal ends immediately. Otherwise, the traversal ends once it is closeable in
    /// the eyes of its [`LinkTraversal::is_closeable`], with the close request taken into account.
    pub fn close(&self) {
        self.core.close();
    }

    /// Tears down the traversal and all of its running sources. The stream then yields `error`,
    /// if any, and ends.
    pub fn destroy(&self, error: Option<QueryError>) {
        self.core.destroy(error);
    }

    pub fn status(&self) -> TraversalStatus {
        *self.core.status.borrow()
    }

    pub fn state(&self) -> TraversalState {
        self.core.state.borrow().clone()
    }

    /// Returns the hooks of this traversal.
    pub fn traversal(&self) -> &T {
        &self.core.traversal
    }

    /// Returns a handle that can control the traversal without owning its records.
    pub fn handle(&self) -> TraversalHandle<T> {
        TraversalHandle {
            core: Arc::downgrade(&self.core),
        }
    }

    /// Converts the iterator into a [`BindingsStream`] carrying the same metadata property.
    pub fn into_bindings_stream(self) -> BindingsStream {
        let metadata = self.metadata_watch();
        RecordStream::new(self, metadata)
    }
}

impl<T: LinkTraversal> Stream for TraversalIterator<T> {
    type Item = Result<Bindings, QueryError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }

        let error = this.core.error();
        if error.is_some() || this.core.destroyed.load(Ordering::Acquire) {
            this.done = true;
            return Poll::Ready(error.map(Err));
        }

        this.core.start();
        match ready!(this.records.poll_recv(cx)) {
            Some(bindings) => Poll::Ready(Some(Ok(bindings))),
            None => {
                this.done = true;
                Poll::Ready(this.core.error().map(Err))
            }
        }
    }
}

impl<T: LinkTraversal> Drop for TraversalIterator<T> {
    fn drop(&mut self) {
        self.core.destroy(None);
    }
}

impl<T: LinkTraversal> Debug for TraversalIterator<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraversalIterator")
            .field("entry", &self.core.entry)
            .field("state", &*self.core.state.borrow())
            .field("status", &*self.core.status.borrow())
            .finish()
    }
}

/// Controls a [`TraversalIterator`] from elsewhere, e.g., from a listener of an
/// [`AggregatingStore`].
///
/// A handle does not keep the traversal alive. Once the iterator is dropped, all operations
/// become no-ops.
pub struct TraversalHandle<T: LinkTraversal> {
    core: Weak<TraversalCore<T>>,
}

impl<T: LinkTraversal> TraversalHandle<T> {
    pub fn kickstart(&self) {
        if let Some(core) = self.core.upgrade() {
            core.start();
        }
    }

    pub fn close(&self) {
        if let Some(core) = self.core.upgrade() {
            core.close();
        }
    }

    pub fn destroy(&self, error: Option<QueryError>) {
        if let Some(core) = self.core.upgrade() {
            core.destroy(error);
        }
    }
}

impl<T: LinkTraversal> Clone for TraversalHandle<T> {
    fn clone(&self) -> Self {
        Self {
            core: Weak::clone(&self.core),
        }
    }
}
