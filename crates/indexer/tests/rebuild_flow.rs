use jobmatch_indexer::{IngestConfig, IngestionManager, PostingInput, RebuildOutcome};
use jobmatch_vector_store::{
    CollectionKind, Embedder, EmbeddingStore, StoreConfig, StubEmbedder,
};
use std::sync::Arc;

const DIM: usize = 16;

async fn batch(prefix: &str, count: usize) -> Vec<PostingInput> {
    let embedder = StubEmbedder::new(DIM);
    let texts: Vec<String> = (0..count).map(|i| format!("{prefix} posting {i}")).collect();
    let vectors = embedder.embed_batch(&texts).await.expect("embed");
    vectors
        .into_iter()
        .enumerate()
        .map(|(i, vector)| PostingInput {
            job_id: format!("{prefix}-{i:04}"),
            title: format!("{prefix} {i}"),
            category: if i % 2 == 0 { "Data Engineer" } else { "Backend Engineer" }.to_string(),
            location: "Remote".to_string(),
            description_embedding: vector,
            metadata: serde_json::json!({"source": prefix}),
            ingestion_month: None,
        })
        .collect()
}

fn manager() -> IngestionManager {
    let store = EmbeddingStore::new(StoreConfig::with_dimension(DIM));
    IngestionManager::new(Arc::new(store), IngestConfig::default())
}

#[tokio::test]
async fn in_flight_search_keeps_reading_its_snapshot_while_rebuild_publishes() {
    let manager = manager();
    manager
        .ingest_postings(batch("first", 300).await, "2026-01")
        .await
        .expect("ingest");
    manager
        .rebuild_index(CollectionKind::Postings)
        .await
        .expect("rebuild s1");

    let s1 = manager.store().posting_snapshot();
    let query = StubEmbedder::new(DIM).embed("data engineer").await.unwrap();
    let baseline: Vec<String> = s1
        .search(&query, 10, None)
        .unwrap()
        .into_iter()
        .map(|hit| hit.record.job_id.clone())
        .collect();

    manager
        .ingest_postings(batch("second", 300).await, "2026-02")
        .await
        .expect("ingest");

    let reader = {
        let s1 = Arc::clone(&s1);
        let query = query.clone();
        std::thread::spawn(move || {
            (0..200)
                .map(|_| {
                    s1.search(&query, 10, None)
                        .unwrap()
                        .into_iter()
                        .map(|hit| hit.record.job_id.clone())
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>()
        })
    };
    let outcome = manager
        .rebuild_index(CollectionKind::Postings)
        .await
        .expect("rebuild s2");
    let observed = reader.join().expect("reader thread");

    assert!(observed.iter().all(|ids| ids == &baseline));
    assert_eq!(s1.len(), 300);

    let s2 = manager.store().posting_snapshot();
    assert_eq!(Some(s2.version()), outcome.published_version());
    assert_eq!(s2.len(), 600);
    assert!(s2.version() > s1.version());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rebuild_requests_coalesce() {
    let manager = Arc::new(manager());
    manager
        .ingest_postings(batch("bulk", 2000).await, "2026-01")
        .await
        .expect("ingest");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.rebuild_index(CollectionKind::Postings).await })
        })
        .collect();
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("join").expect("rebuild"));
    }

    let published = outcomes
        .iter()
        .filter(|o| matches!(o, RebuildOutcome::Published { .. }))
        .count();
    assert!(published >= 1);
    assert!(outcomes
        .iter()
        .all(|o| o.collection() == CollectionKind::Postings));

    // Whatever interleaving happened, the served snapshot reflects the table.
    let status = manager.store().status(CollectionKind::Postings);
    assert!(!status.is_stale());
    assert_eq!(status.snapshot_records, 2000);
}

#[tokio::test]
async fn rebuild_is_idempotent_after_restart() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = StoreConfig::with_dimension(DIM);
    let version = {
        let manager = IngestionManager::open(tmp.path(), config.clone(), IngestConfig::default())
            .await
            .unwrap();
        manager
            .ingest_postings(batch("persisted", 20).await, "2026-01")
            .await
            .unwrap();
        manager
            .rebuild_index(CollectionKind::Postings)
            .await
            .unwrap()
            .published_version()
            .unwrap()
    };

    let manager = IngestionManager::open(tmp.path(), config, IngestConfig::default())
        .await
        .unwrap();
    let outcome = manager.rebuild_index(CollectionKind::Postings).await.unwrap();
    assert_eq!(
        outcome,
        RebuildOutcome::Unchanged {
            collection: CollectionKind::Postings,
            version
        }
    );
}
