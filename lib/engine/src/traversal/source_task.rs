use crate::traversal::iterator::SubQuery;
use crate::traversal::records::RecordSender;
use futures::StreamExt;
use rdf_traversal_common::error::QueryError;
use rdf_traversal_common::HandledDatasets;
use rdf_traversal_model::{Link, Metadata};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct SourceId(pub(crate) u64);

/// Reported by a [`SourceTask`] to the driver.
///
/// A task reports either a single `Failed` (resolution failed), or `Resolved` followed by exactly
/// one `Metadata` and exactly one of `End` and `Failed`, in any order.
pub(crate) enum SourceEvent {
    Resolved {
        id: SourceId,
        metadata: Metadata,
        handled_datasets: HandledDatasets,
    },
    /// `None` if the sub-query closed its metadata property without publishing anything.
    Metadata {
        id: SourceId,
        metadata: Option<Arc<Metadata>>,
    },
    End {
        id: SourceId,
    },
    Failed {
        id: SourceId,
        error: QueryError,
    },
}

/// Resolves one link, queries the source and forwards its records.
pub(crate) struct SourceTask {
    pub(crate) id: SourceId,
    pub(crate) link: Link,
    pub(crate) query: Arc<SubQuery>,
    pub(crate) handled_datasets: HandledDatasets,
    pub(crate) records: RecordSender,
    pub(crate) events: mpsc::UnboundedSender<SourceEvent>,
}

impl SourceTask {
    pub(crate) async fn run(self) {
        let SourceTask {
            id,
            link,
            query,
            handled_datasets,
            records,
            events,
        } = self;

        // Send errors only occur once the driver is gone, in which case nobody is interested.
        let state = match query
            .resolver
            .resolve(&link, &handled_datasets, &query.context)
            .await
        {
            Ok(state) => state,
            Err(error) => {
                events.send(SourceEvent::Failed { id, error }).ok();
                return;
            }
        };

        let stream = state.source.query_bindings(&query.operation, &query.context);
        events
            .send(SourceEvent::Resolved {
                id,
                metadata: state.metadata,
                handled_datasets: state.handled_datasets,
            })
            .ok();

        let (mut bindings, mut metadata) = stream.into_parts();
        let end_events = events.clone();
        let forward = async move {
            let event = loop {
                match bindings.next().await {
                    Some(Ok(solution)) => {
                        // The consumer is gone.
                        if !records.send(solution).await {
                            break SourceEvent::End { id };
                        }
                    }
                    Some(Err(error)) => break SourceEvent::Failed { id, error },
                    None => break SourceEvent::End { id },
                }
            };
            // Dropping the records may close the metadata property of the sub-query.
            drop(bindings);
            end_events.send(event).ok();
        };
        let report = async move {
            let metadata = metadata.first().await;
            events.send(SourceEvent::Metadata { id, metadata }).ok();
        };

        futures::join!(forward, report);
    }
}
