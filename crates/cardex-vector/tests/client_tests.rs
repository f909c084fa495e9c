use std::sync::Arc;
use std::time::Duration;

use cardex_core::traits::VectorStore;
use cardex_core::types::{DistanceMetric, VectorPoint};
use cardex_core::Error;
use cardex_vector::{CancelFlag, IndexClient, MemoryVectorStore, UploadOptions};

fn point(id: &str, vector: Vec<f32>) -> VectorPoint {
    VectorPoint {
        id: id.to_string(),
        vector,
        payload: serde_json::Map::new(),
    }
}

fn points(n: usize, width: usize) -> Vec<VectorPoint> {
    (0..n)
        .map(|i| point(&format!("p{i}"), vec![i as f32 + 1.0; width]))
        .collect()
}

fn fast_opts(batch_size: usize, max_retries: usize) -> UploadOptions {
    UploadOptions {
        batch_size,
        parallelism: 1,
        max_retries,
        retry_base: Duration::from_millis(1),
    }
}

fn client() -> (Arc<MemoryVectorStore>, IndexClient) {
    let store = Arc::new(MemoryVectorStore::new());
    let client = IndexClient::new(Arc::clone(&store) as Arc<dyn VectorStore>);
    (store, client)
}

#[tokio::test]
async fn ensure_collection_is_idempotent() {
    let (store, client) = client();

    client
        .ensure_collection("cards", 4, DistanceMetric::Cosine)
        .await
        .expect("first ensure");
    client
        .ensure_collection("cards", 4, DistanceMetric::Cosine)
        .await
        .expect("second ensure");

    assert_eq!(store.create_calls(), 1, "second ensure must not write");
    assert_eq!(client.list_collections().await.expect("list"), vec!["cards"]);
}

#[tokio::test]
async fn ensure_collection_rejects_width_change() {
    let (_store, client) = client();
    client
        .ensure_collection("cards", 4, DistanceMetric::Cosine)
        .await
        .expect("ensure");

    let err = client
        .ensure_collection("cards", 8, DistanceMetric::Cosine)
        .await
        .expect_err("width change must fail");
    assert!(matches!(err, Error::Consistency(_)));

    // The explicit destructive path is the way out.
    client
        .recreate_collection("cards", 8, DistanceMetric::Cosine)
        .await
        .expect("recreate");
    let report = client
        .bulk_upload("cards", points(3, 8), &fast_opts(2, 0), &CancelFlag::new())
        .await
        .expect("upload");
    assert!(report.is_complete());
}

#[tokio::test]
async fn bulk_upload_lands_every_point() {
    let (store, client) = client();
    client
        .ensure_collection("cards", 4, DistanceMetric::Cosine)
        .await
        .expect("ensure");

    let report = client
        .bulk_upload("cards", points(10, 4), &fast_opts(3, 0), &CancelFlag::new())
        .await
        .expect("upload");

    assert_eq!(report.uploaded, 10);
    assert!(report.is_complete());
    assert_eq!(store.point_count("cards"), 10);
}

#[tokio::test]
async fn transient_failure_recovers_within_retry_budget() {
    let (store, client) = client();
    client
        .ensure_collection("cards", 4, DistanceMetric::Cosine)
        .await
        .expect("ensure");

    // One injected failure, one retry allowed: everything lands.
    store.fail_next_upserts(1);
    let report = client
        .bulk_upload("cards", points(9, 4), &fast_opts(3, 1), &CancelFlag::new())
        .await
        .expect("upload");

    assert_eq!(report.uploaded, 9);
    assert!(report.failed.is_empty());
    assert_eq!(store.point_count("cards"), 9);
}

#[tokio::test]
async fn exhausted_retries_report_only_the_failed_chunk() {
    let (store, client) = client();
    client
        .ensure_collection("cards", 4, DistanceMetric::Cosine)
        .await
        .expect("ensure");

    // First chunk fails its initial attempt and its single retry; the
    // remaining chunks must still go through.
    store.fail_next_upserts(2);
    let report = client
        .bulk_upload("cards", points(9, 4), &fast_opts(3, 1), &CancelFlag::new())
        .await
        .expect("upload");

    assert_eq!(report.failed, vec!["p0", "p1", "p2"]);
    assert_eq!(report.uploaded, 6);
    assert_eq!(store.point_count("cards"), 6);
    assert_eq!(report.unindexed(), vec!["p0", "p1", "p2"]);
}

#[tokio::test]
async fn malformed_points_are_rejected_before_transmission() {
    let (store, client) = client();
    client
        .ensure_collection("cards", 4, DistanceMetric::Cosine)
        .await
        .expect("ensure");

    let mut batch = points(3, 4);
    batch.push(point("bad-width", vec![1.0; 3]));
    batch.push(point("bad-nan", vec![1.0, f32::NAN, 0.0, 0.0]));

    let report = client
        .bulk_upload("cards", batch, &fast_opts(10, 0), &CancelFlag::new())
        .await
        .expect("upload");

    assert_eq!(report.uploaded, 3);
    assert_eq!(report.rejected, vec!["bad-width", "bad-nan"]);
    assert_eq!(store.point_count("cards"), 3);
}

#[tokio::test]
async fn empty_upload_fails_without_touching_the_collection() {
    let (store, client) = client();
    client
        .ensure_collection("cards", 4, DistanceMetric::Cosine)
        .await
        .expect("ensure");

    let err = client
        .bulk_upload("cards", Vec::new(), &fast_opts(2, 0), &CancelFlag::new())
        .await
        .expect_err("empty batch must fail");
    assert!(matches!(err, Error::EmptyInput(_)));
    assert_eq!(store.point_count("cards"), 0);
}

#[tokio::test]
async fn cancellation_abandons_remaining_chunks() {
    let (store, client) = client();
    client
        .ensure_collection("cards", 4, DistanceMetric::Cosine)
        .await
        .expect("ensure");

    let cancel = CancelFlag::new();
    cancel.cancel();
    let report = client
        .bulk_upload("cards", points(6, 4), &fast_opts(2, 0), &cancel)
        .await
        .expect("upload");

    assert!(report.cancelled);
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.skipped.len(), 6);
    assert!(report.failed.is_empty(), "skipped chunks are not failures");
    assert_eq!(store.point_count("cards"), 0);
}

#[tokio::test]
async fn cosine_query_returns_best_match_first() {
    let (_store, client) = client();
    client
        .ensure_collection("cards", 2, DistanceMetric::Cosine)
        .await
        .expect("ensure");
    client
        .bulk_upload(
            "cards",
            vec![
                point("east", vec![1.0, 0.0]),
                point("north", vec![0.0, 1.0]),
                point("northeast", vec![1.0, 1.0]),
            ],
            &fast_opts(10, 0),
            &CancelFlag::new(),
        )
        .await
        .expect("upload");

    let hits = client
        .query("cards", &[1.0, 0.1], 2, None)
        .await
        .expect("query");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "east");
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn euclid_query_sorts_ascending_distance() {
    let (_store, client) = client();
    client
        .ensure_collection("cards", 2, DistanceMetric::Euclid)
        .await
        .expect("ensure");
    client
        .bulk_upload(
            "cards",
            vec![point("near", vec![1.0, 1.0]), point("far", vec![9.0, 9.0])],
            &fast_opts(10, 0),
            &CancelFlag::new(),
        )
        .await
        .expect("upload");

    let hits = client
        .query("cards", &[0.0, 0.0], 2, None)
        .await
        .expect("query");
    assert_eq!(hits[0].id, "near");
    assert!(hits[0].score <= hits[1].score, "lower distance sorts first");
}

#[tokio::test]
async fn query_rejects_width_mismatch() {
    let (_store, client) = client();
    client
        .ensure_collection("cards", 4, DistanceMetric::Cosine)
        .await
        .expect("ensure");

    let err = client
        .query("cards", &[1.0, 2.0], 5, None)
        .await
        .expect_err("wrong width must fail");
    assert!(matches!(err, Error::Consistency(_)));
}
