//! Pipeline orchestrator: sequences fusion → indexing → query behind a
//! single callable surface.
//!
//! State machine: `Idle → Fusing → Indexing → Ready`, with `Ready` the only
//! state that accepts queries. Re-indexing walks the same path again; a
//! failure during `Fusing` or `Indexing` returns the pipeline to `Idle` and
//! surfaces the error.
//!
//! Each (re)index writes into a fresh generation-suffixed collection
//! (`<base>-v<n>`); the previous generation is deleted only after the new
//! one is confirmed fully uploaded, so a half-built index can never mask a
//! working one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, warn};

use cardex_core::traits::{Embedder, VectorStore};
use cardex_core::types::{CardRecord, DistanceMetric, RankedResult, RecordId};
use cardex_core::{Error, Result};
use cardex_fuse::{Fuser, Vocabulary};
use cardex_lexical::LexicalIndex;
use cardex_vector::{CancelFlag, IndexClient, UploadOptions};

use crate::HybridEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Fusing,
    Indexing,
    Ready,
}

impl PipelineState {
    pub fn name(self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Fusing => "fusing",
            PipelineState::Indexing => "indexing",
            PipelineState::Ready => "ready",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base collection name; generations append `-v<n>`.
    pub collection: String,
    /// Categorical fields to one-hot encode, in block order.
    pub categorical_fields: Vec<String>,
    pub metric: DistanceMetric,
    pub upload: UploadOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            collection: "cards".to_string(),
            categorical_fields: Vec::new(),
            metric: DistanceMetric::Cosine,
            upload: UploadOptions::default(),
        }
    }
}

/// What one successful index run produced.
#[derive(Debug, Clone)]
pub struct IndexSummary {
    pub indexed: usize,
    pub duplicates_dropped: usize,
    pub collection: String,
    pub vector_width: usize,
}

/// The one callable surface handed to the presentation layer.
pub struct CatalogPipeline {
    store: Arc<dyn VectorStore>,
    fuser: Arc<Fuser>,
    config: PipelineConfig,
    state: PipelineState,
    generation: u64,
    engine: Option<HybridEngine>,
}

impl CatalogPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            fuser: Arc::new(Fuser::new(embedder)),
            config,
            state: PipelineState::Idle,
            generation: 0,
            engine: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Collection generation currently serving queries, if any.
    pub fn active_collection(&self) -> Option<&str> {
        self.engine.as_ref().map(HybridEngine::collection)
    }

    /// Vocabulary of the active generation; persist it next to the index
    /// so a later process can [`attach`](CatalogPipeline::attach).
    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.engine.as_ref().map(HybridEngine::vocabulary)
    }

    /// Fuse and index `records`, replacing whatever was active.
    pub async fn build_index(&mut self, records: Vec<CardRecord>) -> Result<IndexSummary> {
        self.build_index_with_cancel(records, &CancelFlag::new())
            .await
    }

    /// Like [`build_index`](CatalogPipeline::build_index), with cooperative
    /// cancellation between upload chunks.
    pub async fn build_index_with_cancel(
        &mut self,
        records: Vec<CardRecord>,
        cancel: &CancelFlag,
    ) -> Result<IndexSummary> {
        let (records, duplicates_dropped) = prepare_records(records)?;

        self.state = PipelineState::Fusing;
        match self.run_build(&records, cancel).await {
            Ok(engine) => {
                let summary = IndexSummary {
                    indexed: records.len(),
                    duplicates_dropped,
                    collection: engine.collection().to_string(),
                    vector_width: engine.vocabulary().total_width(),
                };
                info!(
                    collection = %summary.collection,
                    indexed = summary.indexed,
                    "index generation ready"
                );
                self.engine = Some(engine);
                self.state = PipelineState::Ready;
                Ok(summary)
            }
            Err(e) => {
                // The previous generation's data is left in place remotely;
                // only a confirmed build retires it.
                self.engine = None;
                self.state = PipelineState::Idle;
                Err(e)
            }
        }
    }

    async fn run_build(
        &mut self,
        records: &[CardRecord],
        cancel: &CancelFlag,
    ) -> Result<HybridEngine> {
        let (vectors, vocab) = self
            .fuser
            .fuse(records, &self.config.categorical_fields)
            .await?;

        self.state = PipelineState::Indexing;
        let generation = self.generation + 1;
        let collection = generation_name(&self.config.collection, generation);
        let client = IndexClient::new(Arc::clone(&self.store));
        // The staging name is ours alone; wipe any leftover from a crashed
        // run before writing.
        client
            .recreate_collection(&collection, vocab.total_width(), self.config.metric)
            .await?;

        let points = records
            .iter()
            .zip(vectors)
            .map(|(record, vector)| cardex_core::types::VectorPoint {
                id: record.id.clone(),
                vector,
                payload: payload_of(record),
            })
            .collect();
        let report = client
            .bulk_upload(&collection, points, &self.config.upload, cancel)
            .await?;
        if report.cancelled {
            let _ = client.delete_collection(&collection).await;
            return Err(Error::Cancelled);
        }
        let unindexed = report.unindexed();
        if !unindexed.is_empty() {
            let _ = client.delete_collection(&collection).await;
            return Err(Error::PartialUpload { failed: unindexed });
        }

        // The new generation is confirmed built: retire the old one.
        if let Some(previous) = self.engine.as_ref().map(|e| e.collection().to_string()) {
            if let Err(e) = client.delete_collection(&previous).await {
                warn!(collection = %previous, error = %e, "failed to retire old generation");
            }
        }
        self.generation = generation;

        let lexical = LexicalIndex::build(records)?;
        Ok(HybridEngine::new(
            Arc::clone(&self.fuser),
            Arc::clone(&self.store),
            lexical,
            vocab,
            collection,
            self.config.metric,
            Arc::new(record_map(records)),
        ))
    }

    /// Re-enter `Ready` against an index built by an earlier process: the
    /// persisted vocabulary plus the same record set reconstruct the
    /// query-side state without re-uploading vectors.
    pub async fn attach(&mut self, records: Vec<CardRecord>, vocab: Vocabulary) -> Result<()> {
        let (records, _) = prepare_records(records)?;
        let client = IndexClient::new(Arc::clone(&self.store));

        let names = client.list_collections().await?;
        let (collection, generation) = latest_generation(&names, &self.config.collection)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no generation of collection '{}' found",
                    self.config.collection
                ))
            })?;
        let info = self
            .store
            .collection_info(&collection)
            .await?
            .ok_or_else(|| Error::NotFound(format!("collection '{collection}'")))?;
        if info.vector_width != vocab.total_width() {
            return Err(Error::Consistency(format!(
                "collection '{collection}' has width {}, vocabulary encodes width {}",
                info.vector_width,
                vocab.total_width()
            )));
        }

        let lexical = LexicalIndex::build(&records)?;
        self.engine = Some(HybridEngine::new(
            Arc::clone(&self.fuser),
            Arc::clone(&self.store),
            lexical,
            vocab,
            collection,
            info.metric,
            Arc::new(record_map(&records)),
        ));
        self.generation = generation;
        self.state = PipelineState::Ready;
        Ok(())
    }

    /// Query the active index. Accepted only in `Ready`.
    pub async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        popularity_field: Option<&str>,
    ) -> Result<RankedResult> {
        let engine = match (&self.state, &self.engine) {
            (PipelineState::Ready, Some(engine)) => engine,
            _ => {
                return Err(Error::State {
                    expected: PipelineState::Ready.name(),
                    actual: self.state.name(),
                })
            }
        };
        engine.search(query_text, top_k, popularity_field).await
    }
}

fn generation_name(base: &str, generation: u64) -> String {
    format!("{base}-v{generation}")
}

/// Newest `<base>-v<n>` among `names`, with its generation number.
fn latest_generation(names: &[String], base: &str) -> Option<(String, u64)> {
    let prefix = format!("{base}-v");
    names
        .iter()
        .filter_map(|name| {
            name.strip_prefix(&prefix)
                .and_then(|suffix| suffix.parse::<u64>().ok())
                .map(|n| (name.clone(), n))
        })
        .max_by_key(|&(_, n)| n)
}

/// Validate and normalize loader output.
///
/// Rejects an empty batch, records without text and duplicate ids; drops
/// records whose text duplicates an earlier record (first-seen wins) and
/// reports the count.
fn prepare_records(records: Vec<CardRecord>) -> Result<(Vec<CardRecord>, usize)> {
    if records.is_empty() {
        return Err(Error::EmptyInput("no records to index"));
    }
    let mut seen_ids: HashSet<RecordId> = HashSet::with_capacity(records.len());
    let mut seen_texts: HashSet<String> = HashSet::with_capacity(records.len());
    let mut kept = Vec::with_capacity(records.len());
    let mut dropped = 0usize;
    for record in records {
        if record.id.trim().is_empty() {
            return Err(Error::Input("record with empty id".to_string()));
        }
        if record.text.trim().is_empty() {
            return Err(Error::Input(format!("record '{}' has empty text", record.id)));
        }
        if !seen_ids.insert(record.id.clone()) {
            return Err(Error::Input(format!("duplicate record id '{}'", record.id)));
        }
        if !seen_texts.insert(record.text.clone()) {
            dropped += 1;
            continue;
        }
        kept.push(record);
    }
    if dropped > 0 {
        info!(dropped, "dropped duplicate-text records");
    }
    Ok((kept, dropped))
}

fn record_map(records: &[CardRecord]) -> HashMap<RecordId, CardRecord> {
    records
        .iter()
        .map(|r| (r.id.clone(), r.clone()))
        .collect()
}

fn payload_of(record: &CardRecord) -> serde_json::Map<String, serde_json::Value> {
    match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}
