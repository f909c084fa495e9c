//! Capability traits at the seams to the two remote black-box services.
//!
//! Both services stay behind trait objects so the pipeline can run against
//! deterministic in-process fakes in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CollectionInfo, DistanceMetric, FieldFilter, ScoredPoint, VectorPoint};

/// An embedding provider: text in, fixed-width float vector out.
///
/// The provider is consumed, never implemented, by the core; all vectors
/// returned under one `model_id` must share `width()`.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier of the backing model (used as a cache key).
    fn model_id(&self) -> &str;

    /// Embedding dimensionality.
    fn width(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| crate::Error::Service("embedder returned an empty batch".to_string()))
    }
}

/// Raw operations of the remote vector index service.
///
/// This is the transport surface only: no retries, no chunking, no
/// idempotency logic. Policy lives in the index client built on top.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// `None` when the collection does not exist.
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    async fn create_collection(
        &self,
        name: &str,
        vector_width: usize,
        metric: DistanceMetric,
    ) -> Result<()>;

    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert-or-replace points by id. Acknowledged writes are durable.
    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<()>;

    /// Up to `top_k` nearest points, best-match-first per the collection's
    /// metric convention (see [`DistanceMetric`]).
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<ScoredPoint>>;
}
