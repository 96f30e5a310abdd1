use crate::traversal::iterator::TraversalCore;
use crate::traversal::records::RecordSender;
use crate::traversal::source_task::{SourceEvent, SourceId, SourceTask};
use crate::traversal::{LinkTraversal, TraversalState, TraversalStatus};
use rdf_traversal_common::error::QueryError;
use rdf_traversal_common::{HandledDatasets, LinkFrontier};
use rdf_traversal_model::{Link, Metadata};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

/// Runs a traversal until it ends or fails.
pub(crate) async fn drive<T: LinkTraversal>(
    core: Arc<TraversalCore<T>>,
    records: RecordSender,
) {
    let outcome = match core.traversal.frontier(&core.query.context).await {
        Ok(frontier) => Driver::new(Arc::clone(&core), frontier, records.clone()).run().await,
        Err(error) => Err(error.into()),
    };

    if let Err(error) = outcome {
        debug!(entry = core.entry.url(), %error, "Traversal failed");
        core.complete(Some(error), false);
    }
    // The record stream must only close once the final state is visible to the consumer.
    drop(records);
}

enum SourcePhase {
    /// The slot is reserved, the link is being resolved.
    Resolving,
    Resolved {
        /// The metadata of the resolved source, used for link discovery.
        metadata: Metadata,
        ended: bool,
        metadata_handled: bool,
    },
}

/// The single writer of the traversal state.
///
/// Sources run in their own tasks and report to the driver through an event channel. The driver
/// handles one event at a time, so slot accounting, frontier updates and metadata accumulation
/// never race with each other.
struct Driver<T: LinkTraversal> {
    core: Arc<TraversalCore<T>>,
    frontier: Box<dyn LinkFrontier>,
    records: RecordSender,
    events: mpsc::UnboundedReceiver<SourceEvent>,
    event_sender: mpsc::UnboundedSender<SourceEvent>,
    /// Dropping the set aborts all sources.
    tasks: JoinSet<()>,
    sources: HashMap<SourceId, SourcePhase>,
    next_source_id: u64,
    accumulated: Option<Metadata>,
    handled_datasets: HandledDatasets,
    forced_close: bool,
    peak_slots: usize,
}

impl<T: LinkTraversal> Driver<T> {
    fn new(
        core: Arc<TraversalCore<T>>,
        frontier: Box<dyn LinkFrontier>,
        records: RecordSender,
    ) -> Self {
        let (event_sender, events) = mpsc::unbounded_channel();
        Self {
            core,
            frontier,
            records,
            events,
            event_sender,
            tasks: JoinSet::new(),
            sources: HashMap::new(),
            next_source_id: 0,
            accumulated: None,
            handled_datasets: HandledDatasets::new(),
            forced_close: false,
            peak_slots: 0,
        }
    }

    async fn run(mut self) -> Result<(), QueryError> {
        let mut state = self.core.state.subscribe();
        self.forced_close = matches!(*state.borrow_and_update(), TraversalState::Closing);
        self.frontier.push(self.core.entry.clone());

        loop {
            self.schedule();
            self.core.status.send_replace(self.status());
            if self.core.traversal.is_closeable(&self.status(), self.forced_close) {
                self.end();
                return Ok(());
            }

            tokio::select! {
                biased;
                Some(event) = self.events.recv() => self.handle_event(event).await?,
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    check_join(joined)?;
                }
                changed = state.changed(), if !self.forced_close => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    self.forced_close =
                        matches!(*state.borrow_and_update(), TraversalState::Closing);
                }
            }
        }
    }

    fn status(&self) -> TraversalStatus {
        let mut status = TraversalStatus {
            frontier_len: self.frontier.len(),
            peak_slots: self.peak_slots,
            ..TraversalStatus::default()
        };
        for phase in self.sources.values() {
            match phase {
                SourcePhase::Resolving => status.pending_creation += 1,
                SourcePhase::Resolved { ended: false, .. } => status.running += 1,
                SourcePhase::Resolved { ended: true, .. } => status.pending_termination += 1,
            }
        }
        status
    }

    /// Starts sources for queued links while slots are free.
    fn schedule(&mut self) {
        let max_sources = self.core.config.max_concurrent_sources;
        while self.sources.len() < max_sources && !self.frontier.is_empty() {
            // Do not start new work if the traversal could end once the running sources are done.
            let idle = TraversalStatus {
                frontier_len: self.frontier.len(),
                ..TraversalStatus::default()
            };
            if self.core.traversal.is_closeable(&idle, self.forced_close) {
                break;
            }

            let Some(link) = self.frontier.pop() else {
                break;
            };
            self.start_source(link);
        }
        self.peak_slots = self.peak_slots.max(self.sources.len());
    }

    fn start_source(&mut self, link: Link) {
        let id = SourceId(self.next_source_id);
        self.next_source_id += 1;
        debug!(url = link.url(), "Starting source");

        self.sources.insert(id, SourcePhase::Resolving);
        let task = SourceTask {
            id,
            link,
            query: Arc::clone(&self.core.query),
            handled_datasets: self.handled_datasets.clone(),
            records: self.records.clone(),
            events: self.event_sender.clone(),
        };
        self.tasks.spawn(task.run());
    }

    async fn handle_event(&mut self, event: SourceEvent) -> Result<(), QueryError> {
        match event {
            SourceEvent::Resolved {
                id,
                metadata,
                handled_datasets,
            } => {
                self.handled_datasets.extend(handled_datasets);
                if let Some(phase) = self.sources.get_mut(&id) {
                    *phase = SourcePhase::Resolved {
                        metadata,
                        ended: false,
                        metadata_handled: false,
                    };
                }
            }
            SourceEvent::Metadata { id, metadata } => self.handle_metadata(id, metadata).await?,
            SourceEvent::End { id } => self.handle_end(id),
            SourceEvent::Failed { id, error } => {
                if !error.is_transient() {
                    return Err(error);
                }
                warn!(%error, "Skipping source that failed to produce records");
                match self.sources.get(&id) {
                    Some(SourcePhase::Resolving) => {
                        // No metadata follows a failed resolution.
                        self.sources.remove(&id);
                    }
                    Some(SourcePhase::Resolved { .. }) => self.handle_end(id),
                    None => {}
                }
            }
        }
        Ok(())
    }

    fn handle_end(&mut self, id: SourceId) {
        if let Some(SourcePhase::Resolved {
            ended,
            metadata_handled,
            ..
        }) = self.sources.get_mut(&id)
        {
            *ended = true;
            if *metadata_handled {
                self.sources.remove(&id);
            }
        }
    }

    async fn handle_metadata(
        &mut self,
        id: SourceId,
        reported: Option<Arc<Metadata>>,
    ) -> Result<(), QueryError> {
        let discovery_metadata = match self.sources.get(&id) {
            Some(SourcePhase::Resolved { metadata, .. }) => {
                reported.as_ref().map(|reported| metadata.overlay(reported))
            }
            _ => return Ok(()),
        };

        if let (Some(reported), Some(discovery_metadata)) = (reported, discovery_metadata) {
            self.accumulate(&reported).await?;
            self.discover(&discovery_metadata).await?;
        }

        if let Some(SourcePhase::Resolved {
            ended,
            metadata_handled,
            ..
        }) = self.sources.get_mut(&id)
        {
            *metadata_handled = true;
            if *ended {
                self.sources.remove(&id);
            }
        }
        Ok(())
    }

    async fn accumulate(&mut self, appending: &Metadata) -> Result<(), QueryError> {
        let accumulated = match &self.accumulated {
            None => appending.clone(),
            Some(accumulated) => {
                self.core
                    .traversal
                    .accumulate(accumulated, appending, &self.core.query.context)
                    .await?
            }
        };

        if let Some(store) = &self.core.store {
            store.set_base_metadata(accumulated.refreshed());
        }
        // More sources may still report, so the running total is only an estimate.
        self.core.metadata.publish(Metadata {
            cardinality: accumulated.cardinality.as_estimate(),
            ..accumulated.refreshed()
        });
        self.accumulated = Some(accumulated);
        Ok(())
    }

    async fn discover(&mut self, metadata: &Metadata) -> Result<(), QueryError> {
        let links = match self
            .core
            .traversal
            .discover(metadata, &self.core.query.context)
            .await
        {
            Ok(links) => links,
            Err(error) if error.is_protocol_violation() => return Err(error.into()),
            Err(error) => {
                warn!(%error, "Treating source as a dead end");
                Vec::new()
            }
        };

        for link in links {
            let url = link.url().to_owned();
            if self.frontier.push(link) {
                debug!(url = url.as_str(), "Queued link");
            } else {
                debug!(url = url.as_str(), "Frontier rejected link");
            }
        }
        Ok(())
    }

    fn end(&mut self) {
        let accumulated = self.accumulated.take().unwrap_or_default();
        self.core.metadata.publish(accumulated);
        // A forced close may leave links behind.
        let exhausted = self.frontier.is_empty();
        debug!(entry = self.core.entry.url(), exhausted, "Traversal ended");
        self.core.complete(None, exhausted);
    }
}

fn check_join(joined: Result<(), JoinError>) -> Result<(), QueryError> {
    match joined {
        Err(error) if error.is_panic() => Err(QueryError::Task(error.to_string())),
        _ => Ok(()),
    }
}
