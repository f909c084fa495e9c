//! Hybrid query engine: one ranked list out of dense similarity, lexical
//! relevance and a popularity tie-break.
//!
//! Scoring model, in priority order:
//! 1. combined relevance = `SEMANTIC_WEIGHT * dense + LEXICAL_WEIGHT *
//!    lexical`, each signal min-max normalized to [0, 1] over its own
//!    candidate list; a candidate present in only one list keeps that
//!    list's weighted contribution,
//! 2. popularity rank (ascending, lower = more popular), applied only
//!    between exactly equal combined scores — it can never override a
//!    higher relevance score,
//! 3. record id, so full ties stay reproducible across runs.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use cardex_core::traits::VectorStore;
use cardex_core::types::{
    CardRecord, DistanceMetric, RankedHit, RankedResult, RecordId, SearchHit, SourceKind,
};
use cardex_core::{Error, Result};
use cardex_fuse::{Fuser, Vocabulary};
use cardex_lexical::LexicalIndex;
use cardex_vector::IndexClient;

pub mod pipeline;

pub use pipeline::{CatalogPipeline, IndexSummary, PipelineConfig, PipelineState};

/// Candidate lists are fetched `EXPANSION_FACTOR * top_k` deep so that
/// re-ranking has room to move results across the two lists.
pub const EXPANSION_FACTOR: usize = 4;

/// Weight of the normalized dense-similarity signal in the combined score.
pub const SEMANTIC_WEIGHT: f32 = 0.7;

/// Weight of the normalized lexical (BM25) signal in the combined score.
pub const LEXICAL_WEIGHT: f32 = 0.3;

/// Read path over one fully built index generation. Immutable after
/// construction; the pipeline swaps in a new engine on re-index.
pub struct HybridEngine {
    fuser: Arc<Fuser>,
    client: IndexClient,
    lexical: LexicalIndex,
    vocab: Vocabulary,
    collection: String,
    metric: DistanceMetric,
    records: Arc<HashMap<RecordId, CardRecord>>,
}

impl HybridEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fuser: Arc<Fuser>,
        store: Arc<dyn VectorStore>,
        lexical: LexicalIndex,
        vocab: Vocabulary,
        collection: String,
        metric: DistanceMetric,
        records: Arc<HashMap<RecordId, CardRecord>>,
    ) -> Self {
        Self {
            fuser,
            client: IndexClient::new(store),
            lexical,
            vocab,
            collection,
            metric,
            records,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Run one hybrid query.
    ///
    /// Dense and lexical lookups run concurrently and join before fusion.
    /// Empty query text is invalid; an empty candidate set is a valid,
    /// empty result.
    pub async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        popularity_field: Option<&str>,
    ) -> Result<RankedResult> {
        let query = query_text.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("query text is empty".to_string()));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let expanded = top_k.saturating_mul(EXPANSION_FACTOR);
        let query_vector = self.fuser.encode_query(&self.vocab, query).await?;

        let (dense, lexical) = tokio::join!(
            self.client
                .query(&self.collection, &query_vector, expanded, None),
            async { self.lexical.query(query, expanded) },
        );
        let dense: Vec<SearchHit> = dense?
            .into_iter()
            .map(|p| SearchHit {
                id: p.id,
                score: p.score,
                source: SourceKind::Dense,
            })
            .collect();
        let lexical = lexical?;
        debug!(
            dense = dense.len(),
            lexical = lexical.len(),
            "candidate lists fetched"
        );

        let combined = fuse_scores(&dense, &lexical, self.metric);
        let mut hits = self.hydrate(combined, popularity_field);
        hits.sort_by(|a, b| rank_order(a, b, popularity_field.is_some()));
        hits.truncate(top_k);
        Ok(hits)
    }

    fn hydrate(
        &self,
        combined: Vec<(RecordId, f32)>,
        popularity_field: Option<&str>,
    ) -> Vec<RankedHit> {
        let mut hits = Vec::with_capacity(combined.len());
        for (id, score) in combined {
            let Some(record) = self.records.get(&id) else {
                warn!(%id, "candidate has no backing record, dropping");
                continue;
            };
            hits.push(RankedHit {
                id,
                score,
                name: record.display_name().to_string(),
                text: record.text.clone(),
                popularity: popularity_field.and_then(|field| popularity_of(record, field)),
            });
        }
        hits
    }
}

/// Merge the two candidate lists by id into combined scores.
fn fuse_scores(
    dense: &[SearchHit],
    lexical: &[SearchHit],
    metric: DistanceMetric,
) -> Vec<(RecordId, f32)> {
    let dense_norm = normalize(
        &dense.iter().map(|h| h.score).collect::<Vec<_>>(),
        metric.higher_is_better(),
    );
    let lexical_norm = normalize(
        &lexical.iter().map(|h| h.score).collect::<Vec<_>>(),
        true,
    );

    let mut combined: Vec<(RecordId, f32)> = Vec::with_capacity(dense.len() + lexical.len());
    let mut position: HashMap<&str, usize> = HashMap::new();
    for (hit, norm) in dense.iter().zip(&dense_norm) {
        position.insert(hit.id.as_str(), combined.len());
        combined.push((hit.id.clone(), SEMANTIC_WEIGHT * norm));
    }
    for (hit, norm) in lexical.iter().zip(&lexical_norm) {
        match position.get(hit.id.as_str()) {
            Some(&i) => combined[i].1 += LEXICAL_WEIGHT * norm,
            None => combined.push((hit.id.clone(), LEXICAL_WEIGHT * norm)),
        }
    }
    combined
}

/// Min-max normalize a score list to [0, 1], best = 1.
///
/// `higher_is_better` flips orientation for distance-like scores. A
/// constant (or single-element) list maps to all ones: with no spread there
/// is nothing to rank on within the list.
fn normalize(scores: &[f32], higher_is_better: bool) -> Vec<f32> {
    let Some(min) = scores.iter().copied().reduce(f32::min) else {
        return Vec::new();
    };
    let max = scores.iter().copied().fold(min, f32::max);
    let range = max - min;
    if range <= f32::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores
        .iter()
        .map(|&s| {
            if higher_is_better {
                (s - min) / range
            } else {
                (max - s) / range
            }
        })
        .collect()
}

/// Popularity value for the tie-break, from the dedicated field or from
/// passthrough metadata.
fn popularity_of(record: &CardRecord, field: &str) -> Option<f64> {
    if field == "popularity" {
        return record.popularity;
    }
    record.extra.get(field).and_then(|v| v.as_f64())
}

/// Comparator of the final ranking. See the module docs for the key order.
fn rank_order(a: &RankedHit, b: &RankedHit, use_popularity: bool) -> std::cmp::Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            if use_popularity {
                compare_popularity(a.popularity, b.popularity)
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .then_with(|| a.id.cmp(&b.id))
}

fn compare_popularity(a: Option<f64>, b: Option<f64>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f32, popularity: Option<f64>) -> RankedHit {
        RankedHit {
            id: id.to_string(),
            score,
            name: id.to_string(),
            text: String::new(),
            popularity,
        }
    }

    #[test]
    fn normalize_orients_distances() {
        let out = normalize(&[1.0, 3.0, 2.0], false);
        assert_eq!(out, vec![1.0, 0.0, 0.5]);
    }

    #[test]
    fn normalize_constant_list_is_all_ones() {
        assert_eq!(normalize(&[2.5, 2.5], true), vec![1.0, 1.0]);
        assert_eq!(normalize(&[7.0], true), vec![1.0]);
        assert!(normalize(&[], true).is_empty());
    }

    #[test]
    fn popularity_only_breaks_exact_ties() {
        let a = hit("a", 0.9, Some(5000.0));
        let b = hit("b", 0.5, Some(1.0));
        // b is far more popular but scores lower: relevance wins.
        assert_eq!(rank_order(&a, &b, true), std::cmp::Ordering::Less);

        let c = hit("c", 0.5, Some(10.0));
        let d = hit("d", 0.5, Some(200.0));
        // Equal scores: lower rank (more popular) first.
        assert_eq!(rank_order(&c, &d, true), std::cmp::Ordering::Less);
        assert_eq!(rank_order(&d, &c, true), std::cmp::Ordering::Greater);
    }

    #[test]
    fn missing_popularity_sorts_after_present() {
        let known = hit("k", 0.5, Some(9999.0));
        let unknown = hit("u", 0.5, None);
        assert_eq!(rank_order(&known, &unknown, true), std::cmp::Ordering::Less);
    }

    #[test]
    fn full_ties_fall_back_to_id() {
        let a = hit("a", 0.5, None);
        let b = hit("b", 0.5, None);
        assert_eq!(rank_order(&a, &b, false), std::cmp::Ordering::Less);
    }

    #[test]
    fn fuse_sums_weighted_signals_for_shared_ids() {
        let dense = vec![
            SearchHit {
                id: "1".into(),
                score: 0.9,
                source: SourceKind::Dense,
            },
            SearchHit {
                id: "2".into(),
                score: 0.1,
                source: SourceKind::Dense,
            },
        ];
        let lexical = vec![
            SearchHit {
                id: "1".into(),
                score: 4.0,
                source: SourceKind::Lexical,
            },
            SearchHit {
                id: "3".into(),
                score: 1.0,
                source: SourceKind::Lexical,
            },
        ];

        let combined = fuse_scores(&dense, &lexical, DistanceMetric::Cosine);
        let by_id: HashMap<&str, f32> =
            combined.iter().map(|(id, s)| (id.as_str(), *s)).collect();

        // id 1 is best in both lists: full weight from each side.
        assert!((by_id["1"] - (SEMANTIC_WEIGHT + LEXICAL_WEIGHT)).abs() < 1e-6);
        // id 2 only appears dense-side, id 3 only lexical-side.
        assert!((by_id["2"] - 0.0).abs() < 1e-6);
        assert!((by_id["3"] - 0.0).abs() < 1e-6);
    }
}
