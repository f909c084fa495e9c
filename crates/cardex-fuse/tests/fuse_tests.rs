use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use cardex_core::traits::Embedder;
use cardex_core::types::CardRecord;
use cardex_core::{Error, Result};
use cardex_embed::HashEmbedder;
use cardex_fuse::{Fuser, Vocabulary};

fn record(id: &str, text: &str, categories: &[(&str, &str)]) -> CardRecord {
    CardRecord {
        id: id.to_string(),
        text: text.to_string(),
        categories: categories
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        popularity: None,
        extra: HashMap::new(),
    }
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn sample_records() -> Vec<CardRecord> {
    vec![
        record("1", "Counter target spell", &[("rarity", "common"), ("color", "U")]),
        record("2", "Destroy target creature", &[("rarity", "rare"), ("color", "B")]),
        record("3", "Draw two cards", &[("rarity", "common")]),
    ]
}

#[tokio::test]
async fn fused_width_is_semantic_plus_distinct_value_counts() {
    let embedder = Arc::new(HashEmbedder::new(48));
    let fuser = Fuser::new(embedder);
    let records = sample_records();

    let (vectors, vocab) = fuser
        .fuse(&records, &fields(&["rarity", "color"]))
        .await
        .expect("fuse");

    // rarity: {common, rare} = 2, color: {U, B} = 2
    assert_eq!(vocab.semantic_width, 48);
    assert_eq!(vocab.categorical_width(), 4);
    assert_eq!(vocab.total_width(), 52);
    for v in &vectors {
        assert_eq!(v.len(), 52);
    }
}

#[tokio::test]
async fn categorical_blocks_are_bit_identical_across_runs() {
    let embedder = Arc::new(HashEmbedder::new(16));
    let records = sample_records();
    let names = fields(&["rarity", "color"]);

    let (a, vocab_a) = Fuser::new(Arc::clone(&embedder) as Arc<dyn Embedder>)
        .fuse(&records, &names)
        .await
        .expect("fuse");
    let (b, vocab_b) = Fuser::new(embedder).fuse(&records, &names).await.expect("fuse");

    assert_eq!(vocab_a, vocab_b);
    for (va, vb) in a.iter().zip(&b) {
        assert_eq!(va[16..], vb[16..], "categorical blocks must be reproducible");
    }
}

#[tokio::test]
async fn vocabulary_values_keep_first_seen_order() {
    let records = sample_records();
    let vocab = Vocabulary::scan(&records, &fields(&["rarity", "color"]), 8);

    assert_eq!(vocab.fields[0].name, "rarity");
    assert_eq!(vocab.fields[0].values, vec!["common", "rare"]);
    assert_eq!(vocab.fields[1].values, vec!["U", "B"]);
}

#[tokio::test]
async fn missing_field_encodes_to_zero_block() {
    let records = sample_records();
    let vocab = Vocabulary::scan(&records, &fields(&["rarity", "color"]), 4);

    // Record 3 has no color: its color sub-vector is all zeros.
    let block = vocab.encode_categorical(&records[2]);
    assert_eq!(block, vec![1.0, 0.0, 0.0, 0.0]);
}

#[tokio::test]
async fn each_record_sets_exactly_one_bit_per_present_field() {
    let records = sample_records();
    let vocab = Vocabulary::scan(&records, &fields(&["rarity", "color"]), 4);

    let block = vocab.encode_categorical(&records[1]);
    // rarity block [common, rare] then color block [U, B]
    assert_eq!(block, vec![0.0, 1.0, 0.0, 1.0]);
}

#[tokio::test]
async fn empty_input_is_rejected() {
    let fuser = Fuser::new(Arc::new(HashEmbedder::new(8)));
    let err = fuser.fuse(&[], &fields(&["rarity"])).await.expect_err("must fail");
    assert!(matches!(err, Error::EmptyInput(_)));
}

#[tokio::test]
async fn query_encoding_zero_fills_the_categorical_block() {
    let embedder = Arc::new(HashEmbedder::new(24));
    let fuser = Fuser::new(embedder);
    let records = sample_records();

    let (_, vocab) = fuser
        .fuse(&records, &fields(&["rarity", "color"]))
        .await
        .expect("fuse");
    let q = fuser
        .encode_query(&vocab, "counter a creature spell")
        .await
        .expect("encode query");

    assert_eq!(q.len(), vocab.total_width());
    assert!(q[24..].iter().all(|&x| x == 0.0));
    assert!(q[..24].iter().any(|&x| x != 0.0));
}

#[tokio::test]
async fn vocabulary_round_trips_through_json() {
    let records = sample_records();
    let vocab = Vocabulary::scan(&records, &fields(&["rarity", "color"]), 768);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vocabulary.json");
    vocab.save(&path).expect("save");
    let loaded = Vocabulary::load(&path).expect("load");

    assert_eq!(vocab, loaded);
}

/// Counts embed calls so cache behavior is observable.
struct CountingEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
    fn width(&self) -> usize {
        self.inner.width()
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }
}

#[tokio::test]
async fn cache_prevents_re_embedding_known_texts() {
    let embedder = Arc::new(CountingEmbedder {
        inner: HashEmbedder::new(8),
        calls: AtomicUsize::new(0),
    });
    let fuser = Fuser::new(Arc::clone(&embedder) as Arc<dyn Embedder>);
    let records = sample_records();
    let names = fields(&["rarity"]);

    fuser.fuse(&records, &names).await.expect("first fuse");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);

    fuser.fuse(&records, &names).await.expect("second fuse");
    assert_eq!(
        embedder.calls.load(Ordering::SeqCst),
        3,
        "second run must be served from the cache"
    );
}

/// Returns a wrong-width vector for one specific text.
struct DriftingEmbedder;

#[async_trait]
impl Embedder for DriftingEmbedder {
    fn model_id(&self) -> &str {
        "fake:drift"
    }
    fn width(&self) -> usize {
        4
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| if t.contains("short") { vec![0.5; 3] } else { vec![0.5; 4] })
            .collect())
    }
}

#[tokio::test]
async fn dimension_drift_is_detected_not_padded() {
    let fuser = Fuser::new(Arc::new(DriftingEmbedder));
    let records = vec![
        record("1", "a normal text", &[]),
        record("2", "a short one", &[]),
    ];

    let err = fuser.fuse(&records, &[]).await.expect_err("must fail");
    assert!(matches!(
        err,
        Error::InconsistentDimension { expected: 4, got: 3 }
    ));
}
