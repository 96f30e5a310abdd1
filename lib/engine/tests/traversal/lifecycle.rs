use crate::common::{record, traverse, url, MetadataTiming, Page, PageResolver};
use futures::{StreamExt, TryStreamExt};
use rdf_traversal_common::error::QueryError;
use rdf_traversal_common::{SourceStateResolver, TraversalConfig};
use rdf_traversal_engine::{MediatedTraversalIterator, TraversalRequest, TraversalState};
use rdf_traversal_model::{Cardinality, Link, QueryContext};
use rdf_traversal_storage::AggregatingStore;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

/// A chain of pages that each only reveal the next page 50ms after they were queried.
fn slow_chain(length: usize) -> Arc<PageResolver> {
    let names = (0..length).map(|i| format!("p{i}")).collect::<Vec<_>>();
    Arc::new(PageResolver::new(names.iter().enumerate().map(|(i, name)| {
        let page = Page::new(name, 1)
            .with_timing(MetadataTiming::AfterEnd)
            .with_delay(Duration::from_millis(50));
        match names.get(i + 1) {
            Some(next) => page.link_to(&[next.as_str()]),
            None => page,
        }
    })))
}

#[tokio::test]
async fn test_destroy_stops_traversal() -> Result<(), Box<dyn Error>> {
    let resolver = slow_chain(6);
    let mut iterator = traverse(&resolver, "p0", &TraversalConfig::default());

    let first = iterator.next().await.transpose()?;
    assert_eq!(first, Some(record("p0", 0)));

    iterator.destroy(Some(QueryError::Unsupported("Stopping".to_owned())));

    assert!(matches!(
        iterator.next().await,
        Some(Err(QueryError::Unsupported(_)))
    ));
    assert!(iterator.next().await.is_none());
    assert!(matches!(iterator.state(), TraversalState::Errored(_)));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(resolver.total_resolutions(), 1);
    Ok(())
}

#[tokio::test]
async fn test_destroy_without_error_ends_silently() {
    let resolver = slow_chain(3);
    let mut iterator = traverse(&resolver, "p0", &TraversalConfig::default());

    iterator.next().await;
    iterator.destroy(None);

    assert!(iterator.next().await.is_none());
    assert!(matches!(iterator.state(), TraversalState::Ended));
}

#[tokio::test]
async fn test_close_lets_running_sources_finish() -> Result<(), Box<dyn Error>> {
    let resolver = Arc::new(PageResolver::new([
        Page::new("p0", 2)
            .link_to(&["p1", "p2"])
            .with_delay(Duration::from_millis(50)),
        Page::new("p1", 1),
        Page::new("p2", 1),
    ]));
    let config = TraversalConfig::default().with_max_concurrent_sources(1);
    let mut iterator = traverse(&resolver, "p0", &config);

    let first = iterator.next().await.transpose()?;
    assert_eq!(first, Some(record("p0", 0)));
    iterator.close();

    let rest = iterator.by_ref().try_collect::<Vec<_>>().await?;
    assert_eq!(rest, vec![record("p0", 1)]);
    assert_eq!(resolver.total_resolutions(), 1);
    assert!(matches!(iterator.state(), TraversalState::Ended));
    Ok(())
}

#[tokio::test]
async fn test_close_before_start_ends_immediately() {
    let resolver = slow_chain(2);
    let mut iterator = traverse(&resolver, "p0", &TraversalConfig::default());

    iterator.close();

    assert!(iterator.next().await.is_none());
    assert_eq!(resolver.total_resolutions(), 0);
}

#[tokio::test]
async fn test_metadata_before_start_only_queries_entry() -> Result<(), Box<dyn Error>> {
    let resolver = Arc::new(PageResolver::new([
        Page::new("p0", 3).link_to(&["p1"]),
        Page::new("p1", 2),
    ]));
    let iterator = traverse(&resolver, "p0", &TraversalConfig::default());

    let (first, second) = tokio::join!(iterator.metadata(), iterator.metadata());
    assert_eq!(first?.cardinality, Cardinality::exact(3.0));
    assert_eq!(second?.cardinality, Cardinality::exact(3.0));

    assert!(matches!(iterator.state(), TraversalState::Cold));
    assert_eq!(resolver.resolutions("p0"), 1);
    assert_eq!(resolver.resolutions("p1"), 0);

    let records = iterator.try_collect::<Vec<_>>().await?;
    assert_eq!(records.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_kickstart_starts_without_polling() {
    let resolver = Arc::new(PageResolver::new([
        Page::new("p0", 1).link_to(&["p1"]),
        Page::new("p1", 1),
    ]));
    let iterator = traverse(&resolver, "p0", &TraversalConfig::default());
    let handle = iterator.handle();

    handle.kickstart();
    handle.kickstart();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(resolver.resolutions("p0"), 1);
    assert_eq!(resolver.resolutions("p1"), 1);
    assert!(matches!(iterator.state(), TraversalState::Ended));

    drop(iterator);
    // Handles do not keep the traversal alive.
    handle.kickstart();
}

#[tokio::test]
async fn test_attached_store_is_ended_with_traversal() -> Result<(), Box<dyn Error>> {
    let resolver = Arc::new(PageResolver::new([
        Page::new("p0", 2).link_to(&["p1"]),
        Page::new("p1", 2),
    ]));
    let store = AggregatingStore::new();
    let request = TraversalRequest::new(
        Link::new(url("p0")),
        crate::common::operation(),
        QueryContext::new(),
        Arc::clone(&resolver) as Arc<dyn SourceStateResolver>,
    )
    .with_aggregating_store(store.clone());
    let iterator = MediatedTraversalIterator::new(
        crate::common::collaborators(Arc::default()),
        request,
        &TraversalConfig::default(),
    );
    assert_eq!(store.listener_count(), 1);

    let records = iterator.try_collect::<Vec<_>>().await?;
    assert_eq!(records.len(), 4);
    assert!(store.has_ended());
    assert_eq!(store.listener_count(), 0);
    assert_eq!(
        store.base_metadata().map(|metadata| metadata.cardinality.clone()),
        Some(Cardinality::exact(4.0))
    );
    Ok(())
}

fn filling(resolver: &Arc<PageResolver>, store: &AggregatingStore) -> MediatedTraversalIterator {
    let request = TraversalRequest::new(
        Link::new(url("p0")),
        crate::common::operation(),
        QueryContext::new(),
        Arc::clone(resolver) as Arc<dyn SourceStateResolver>,
    )
    .with_aggregating_store(store.clone());
    MediatedTraversalIterator::new(
        crate::common::collaborators(Arc::default()),
        request,
        &TraversalConfig::default().with_buffer_size(1),
    )
}

#[tokio::test]
async fn test_dropped_traversal_abandons_store() -> Result<(), Box<dyn Error>> {
    let resolver = slow_chain(3);
    let store = AggregatingStore::new();
    let mut iterator = filling(&resolver, &store);

    let first = iterator.next().await.transpose()?;
    assert_eq!(first, Some(record("p0", 0)));
    drop(iterator);

    assert!(store.is_abandoned());
    assert!(!store.has_ended());
    assert_eq!(store.listener_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_store_match_runs_traversal_without_reader() -> Result<(), Box<dyn Error>> {
    let resolver = Arc::new(PageResolver::new([
        Page::new("p0", 3).link_to(&["p1"]),
        Page::new("p1", 3),
    ]));
    let store = AggregatingStore::new();
    let iterator = filling(&resolver, &store);

    let pattern = crate::common::operation()
        .as_quad_pattern()
        .ok_or("single pattern")?;
    let matches = store.match_pattern(pattern);
    tokio::time::timeout(Duration::from_secs(3), matches.try_collect::<Vec<_>>()).await??;

    assert!(store.has_ended());
    assert_eq!(resolver.resolutions("p1"), 1);
    // The records stayed buffered for the consumer.
    assert_eq!(iterator.try_collect::<Vec<_>>().await?.len(), 6);
    Ok(())
}

#[tokio::test]
async fn test_metadata_before_start_reads_records_of_lazy_source() -> Result<(), Box<dyn Error>> {
    let resolver = Arc::new(PageResolver::new([
        Page::new("p0", 2).with_timing(MetadataTiming::OnExhaustion),
    ]));
    let iterator = traverse(&resolver, "p0", &TraversalConfig::default());

    let metadata = tokio::time::timeout(Duration::from_secs(2), iterator.metadata()).await??;
    assert_eq!(metadata.cardinality, Cardinality::exact(2.0));
    assert!(matches!(iterator.state(), TraversalState::Cold));

    let records = iterator.try_collect::<Vec<_>>().await?;
    assert_eq!(records, vec![record("p0", 0), record("p0", 1)]);
    Ok(())
}
