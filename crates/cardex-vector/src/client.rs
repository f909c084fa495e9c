//! Lifecycle and upload policy on top of a [`VectorStore`] transport.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{error, info, warn};

use cardex_core::traits::VectorStore;
use cardex_core::types::{DistanceMetric, FieldFilter, RecordId, ScoredPoint, VectorPoint};
use cardex_core::{Error, Result};

use crate::{CancelFlag, UploadOptions, UploadReport};

/// Thin, stateless client: all collection state lives in the remote index,
/// all configuration in the per-call arguments.
pub struct IndexClient {
    store: Arc<dyn VectorStore>,
}

enum ChunkOutcome {
    Uploaded(usize),
    Failed(Vec<RecordId>),
    Skipped(Vec<RecordId>),
}

impl IndexClient {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Idempotent create: an existing collection with matching parameters is
    /// left untouched (logged, no write); a missing one is created. A
    /// mismatch in width or metric is a consistency error — recreation is
    /// destructive and must go through [`recreate_collection`] explicitly.
    ///
    /// [`recreate_collection`]: IndexClient::recreate_collection
    pub async fn ensure_collection(
        &self,
        name: &str,
        vector_width: usize,
        metric: DistanceMetric,
    ) -> Result<()> {
        match self.store.collection_info(name).await? {
            Some(info) => {
                if info.vector_width != vector_width {
                    return Err(Error::Consistency(format!(
                        "collection '{name}' has width {}, requested {vector_width}; \
                         recreate it explicitly to change the width",
                        info.vector_width
                    )));
                }
                if info.metric != metric {
                    return Err(Error::Consistency(format!(
                        "collection '{name}' uses {:?}, requested {metric:?}; \
                         recreate it explicitly to change the metric",
                        info.metric
                    )));
                }
                info!(collection = name, "collection already exists, leaving untouched");
                Ok(())
            }
            None => {
                info!(collection = name, vector_width, "creating collection");
                self.store.create_collection(name, vector_width, metric).await
            }
        }
    }

    /// Destructive replace: drop the collection if present, then create it
    /// fresh with the given parameters.
    pub async fn recreate_collection(
        &self,
        name: &str,
        vector_width: usize,
        metric: DistanceMetric,
    ) -> Result<()> {
        if self.store.collection_info(name).await?.is_some() {
            warn!(collection = name, "dropping existing collection");
            self.store.delete_collection(name).await?;
        }
        self.store.create_collection(name, vector_width, metric).await
    }

    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.store.delete_collection(name).await
    }

    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.store.list_collections().await
    }

    /// Upload `points` in chunks of `opts.batch_size`, at most
    /// `opts.parallelism` chunks in flight, each chunk retried with
    /// exponential backoff on transient errors.
    ///
    /// Malformed vectors (width mismatch, NaN/Inf) are rejected before
    /// transmission and never retried. A chunk that exhausts its retries
    /// contributes its ids to `failed` instead of aborting the rest of the
    /// upload. Cancellation is honored between chunks: in-flight chunks
    /// finish, untouched chunks land in `skipped`.
    pub async fn bulk_upload(
        &self,
        name: &str,
        points: Vec<VectorPoint>,
        opts: &UploadOptions,
        cancel: &CancelFlag,
    ) -> Result<UploadReport> {
        if points.is_empty() {
            return Err(Error::EmptyInput("bulk upload of zero points"));
        }
        let info = self
            .store
            .collection_info(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("collection '{name}'")))?;

        let mut report = UploadReport::default();
        let mut valid = Vec::with_capacity(points.len());
        for point in points {
            match validate_vector(&point.vector, info.vector_width) {
                Ok(()) => valid.push(point),
                Err(reason) => {
                    warn!(id = %point.id, %reason, "rejecting malformed point");
                    report.rejected.push(point.id);
                }
            }
        }

        let chunks: Vec<Vec<VectorPoint>> = valid
            .chunks(opts.batch_size.max(1))
            .map(<[VectorPoint]>::to_vec)
            .collect();
        let outcomes = futures::stream::iter(chunks.into_iter().map(|chunk| {
            let store = Arc::clone(&self.store);
            let cancel = cancel.clone();
            let name = name.to_string();
            let max_retries = opts.max_retries;
            let retry_base = opts.retry_base;
            async move {
                if cancel.is_cancelled() {
                    return ChunkOutcome::Skipped(chunk.into_iter().map(|p| p.id).collect());
                }
                upload_chunk(&*store, &name, chunk, max_retries, retry_base).await
            }
        }))
        .buffer_unordered(opts.parallelism.max(1))
        .collect::<Vec<_>>()
        .await;

        for outcome in outcomes {
            match outcome {
                ChunkOutcome::Uploaded(n) => report.uploaded += n,
                ChunkOutcome::Failed(ids) => report.failed.extend(ids),
                ChunkOutcome::Skipped(ids) => report.skipped.extend(ids),
            }
        }
        report.cancelled = cancel.is_cancelled();
        if !report.failed.is_empty() {
            warn!(
                collection = name,
                failed = report.failed.len(),
                "bulk upload finished with failures"
            );
        }
        Ok(report)
    }

    /// Up to `top_k` nearest points, best-match-first.
    ///
    /// Ordering follows the collection's metric convention: cosine and dot
    /// scores sort descending (higher similarity first), euclidean
    /// distances sort ascending (lower distance first). The raw score is
    /// passed through unchanged.
    pub async fn query(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        let info = self
            .store
            .collection_info(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("collection '{name}'")))?;
        if vector.len() != info.vector_width {
            return Err(Error::Consistency(format!(
                "query vector width {} does not match collection '{name}' width {}",
                vector.len(),
                info.vector_width
            )));
        }
        if let Err(reason) = validate_vector(vector, info.vector_width) {
            return Err(Error::Input(format!("query vector {reason}")));
        }

        let mut hits = self.store.search(name, vector, top_k, filter).await?;
        if info.metric.higher_is_better() {
            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        } else {
            hits.sort_by(|a, b| a.score.total_cmp(&b.score));
        }
        hits.truncate(top_k);
        Ok(hits)
    }
}

async fn upload_chunk(
    store: &dyn VectorStore,
    name: &str,
    chunk: Vec<VectorPoint>,
    max_retries: usize,
    retry_base: Duration,
) -> ChunkOutcome {
    let size = chunk.len();
    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = retry_base * (1 << (attempt - 1).min(6)) as u32;
            warn!(collection = name, attempt, ?delay, "retrying chunk upload");
            tokio::time::sleep(delay).await;
        }
        match store.upsert(name, &chunk).await {
            Ok(()) => return ChunkOutcome::Uploaded(size),
            Err(e) if e.is_transient() => {
                warn!(collection = name, attempt, error = %e, "transient chunk failure");
            }
            Err(e) => {
                error!(collection = name, error = %e, "fatal chunk failure, not retrying");
                return ChunkOutcome::Failed(chunk.into_iter().map(|p| p.id).collect());
            }
        }
    }
    ChunkOutcome::Failed(chunk.into_iter().map(|p| p.id).collect())
}

fn validate_vector(vector: &[f32], expected_width: usize) -> std::result::Result<(), String> {
    if vector.len() != expected_width {
        return Err(format!(
            "has width {}, collection expects {expected_width}",
            vector.len()
        ));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err("contains NaN or infinite values".to_string());
    }
    Ok(())
}
