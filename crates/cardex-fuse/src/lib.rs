//! Feature fusion: one fixed-width comparable vector per catalog record.
//!
//! A fused vector is the concatenation of the semantic embedding of `text`
//! and one one-hot block per configured categorical field, in that order.
//! All vectors of one fusion run share the same width; the [`Vocabulary`]
//! records the layout so queries encode against the same positions later.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use cardex_core::traits::Embedder;
use cardex_core::types::CardRecord;
use cardex_core::{Error, Result};

pub mod vocabulary;

pub use vocabulary::{FieldVocabulary, Vocabulary};

const DEFAULT_EMBED_BATCH: usize = 64;

/// Builds fused vectors through an [`Embedder`].
///
/// Embedding calls go through an in-memory write-through cache keyed by
/// content hash and model id, so re-fusing an overlapping corpus does not
/// re-embed unchanged texts.
pub struct Fuser {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl Fuser {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            batch_size: DEFAULT_EMBED_BATCH,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Fuse `records` into vectors, one per record in input order.
    ///
    /// The full input is scanned for the vocabulary before any vector is
    /// finalized. Fails with an empty-input error on an empty slice and
    /// with an inconsistent-dimension error if the embedder ever returns a
    /// vector that does not match its declared width.
    pub async fn fuse(
        &self,
        records: &[CardRecord],
        field_names: &[String],
    ) -> Result<(Vec<Vec<f32>>, Vocabulary)> {
        if records.is_empty() {
            return Err(Error::EmptyInput("no records to fuse"));
        }

        let vocab = Vocabulary::scan(records, field_names, self.embedder.width());
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let embeddings = self.embed_all(&texts).await?;

        let mut fused = Vec::with_capacity(records.len());
        for (record, semantic) in records.iter().zip(embeddings) {
            let mut vector = semantic;
            vector.extend(vocab.encode_categorical(record));
            debug_assert_eq!(vector.len(), vocab.total_width());
            fused.push(vector);
        }
        Ok((fused, vocab))
    }

    /// Encode a free-text query into the subspace of a stored collection.
    ///
    /// The semantic block is embedded as usual; the categorical block is
    /// zero-filled, because a query string carries no categorical identity.
    /// This asymmetry is deliberate: categorical positions contribute to a
    /// query's ranking only through the stored vectors.
    pub async fn encode_query(&self, vocab: &Vocabulary, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_all(&[text.to_string()]).await?;
        let mut vector = out
            .pop()
            .ok_or_else(|| Error::Service("embedder returned an empty batch".to_string()))?;
        vector.extend(vocab.zero_categorical());
        Ok(vector)
    }

    /// Embed texts with caching and batching, enforcing a uniform width.
    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let expected = self.embedder.width();
        let keys: Vec<String> = texts.iter().map(|t| self.cache_key(t)).collect();

        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<usize> = Vec::new();
        {
            let cache = self.cache.lock().map_err(|_| poisoned())?;
            for (i, key) in keys.iter().enumerate() {
                match cache.get(key) {
                    Some(v) => vectors[i] = Some(v.clone()),
                    None => misses.push(i),
                }
            }
        }
        debug!(total = texts.len(), misses = misses.len(), "embedding batch");

        for chunk in misses.chunks(self.batch_size) {
            let batch: Vec<String> = chunk.iter().map(|&i| texts[i].clone()).collect();
            let embedded = self.embedder.embed_batch(&batch).await?;
            if embedded.len() != batch.len() {
                return Err(Error::Service(format!(
                    "embedder returned {} vectors for {} inputs",
                    embedded.len(),
                    batch.len()
                )));
            }
            let mut cache = self.cache.lock().map_err(|_| poisoned())?;
            for (&i, vector) in chunk.iter().zip(embedded) {
                if vector.len() != expected {
                    return Err(Error::InconsistentDimension {
                        expected,
                        got: vector.len(),
                    });
                }
                cache.insert(keys[i].clone(), vector.clone());
                vectors[i] = Some(vector);
            }
        }

        Ok(vectors.into_iter().flatten().collect())
    }

    fn cache_key(&self, text: &str) -> String {
        format!(
            "{}:{}",
            self.embedder.model_id(),
            blake3::hash(text.as_bytes()).to_hex()
        )
    }
}

fn poisoned() -> Error {
    Error::Service("embedding cache lock poisoned".to_string())
}
