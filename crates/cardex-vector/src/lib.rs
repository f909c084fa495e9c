//! cardex-vector
//!
//! Client for the remote similarity index. The transport is the
//! [`VectorStore`](cardex_core::traits::VectorStore) capability trait with
//! two implementations ([`HttpVectorStore`], [`MemoryVectorStore`]); upload
//! and lifecycle policy lives in [`IndexClient`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub mod client;
pub mod http;
pub mod memory;

pub use client::IndexClient;
pub use http::HttpVectorStore;
pub use memory::MemoryVectorStore;

use cardex_core::types::RecordId;

/// Tuning knobs for one bulk upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Points per chunk.
    pub batch_size: usize,
    /// Maximum in-flight chunk uploads.
    pub parallelism: usize,
    /// Retries per chunk on transient failure, beyond the first attempt.
    pub max_retries: usize,
    /// Base delay of the exponential backoff between attempts.
    pub retry_base: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            batch_size: 128,
            parallelism: 4,
            max_retries: 3,
            retry_base: Duration::from_millis(500),
        }
    }
}

/// Outcome of one bulk upload. Delivery is at-least-once per acknowledged
/// chunk, not transactional across the batch: `failed` and `rejected` list
/// the ids that did not make it, they are never silently dropped.
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Points acknowledged by the service.
    pub uploaded: usize,
    /// Ids whose chunk exhausted its retries or hit a fatal service error.
    pub failed: Vec<RecordId>,
    /// Ids rejected before transmission (wrong width, non-finite values).
    pub rejected: Vec<RecordId>,
    /// Ids never attempted because the upload was cancelled.
    pub skipped: Vec<RecordId>,
    /// True when cancellation cut the upload short.
    pub cancelled: bool,
}

impl UploadReport {
    /// Every point made it into the collection.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.rejected.is_empty() && self.skipped.is_empty()
    }

    /// Ids that are not in the collection after this upload.
    pub fn unindexed(&self) -> Vec<RecordId> {
        let mut ids = Vec::with_capacity(self.failed.len() + self.rejected.len());
        ids.extend(self.rejected.iter().cloned());
        ids.extend(self.failed.iter().cloned());
        ids
    }
}

/// Cooperative cancellation handle for long-running uploads.
///
/// Checked between chunks only: an in-flight chunk always runs to
/// completion so the collection never holds a partially written chunk.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
