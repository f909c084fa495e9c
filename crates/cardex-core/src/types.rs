//! Domain types shared by the fusion, lexical and vector engines.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type RecordId = String;

/// One catalog entry as delivered by the external loader.
///
/// - `id`: stable unique identifier
/// - `text`: primary content, used for both semantic and lexical matching
/// - `categories`: named categorical attributes drawn from small closed
///   value sets (e.g. rarity, color identity)
/// - `popularity`: external popularity rank, lower = more popular; only
///   ever used as a tie-break key
/// - `extra`: display metadata passed through untouched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardRecord {
    pub id: RecordId,
    pub text: String,
    #[serde(default)]
    pub categories: HashMap<String, String>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CardRecord {
    /// Value of a categorical field, checking the explicit `categories` map
    /// first and falling back to flat passthrough metadata. Loaders that
    /// deliver flat records (one column per attribute) work unchanged.
    pub fn category(&self, field: &str) -> Option<&str> {
        if let Some(v) = self.categories.get(field) {
            return Some(v.as_str());
        }
        self.extra.get(field).and_then(|v| v.as_str())
    }

    /// Human-readable name for result display; falls back to the id.
    pub fn display_name(&self) -> &str {
        self.extra
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.id)
    }
}

/// Indicates which index produced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Dense,
    Lexical,
}

/// The minimal surface returned by both index read paths.
///
/// `score` is engine-specific; orientation depends on the source (see the
/// engine docs). `source` labels the origin index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: RecordId,
    pub score: f32,
    pub source: SourceKind,
}

/// Distance metric of a vector collection.
///
/// Sort conventions differ per metric: `Cosine` and `Dot` scores are
/// higher-is-better, `Euclid` distances are lower-is-better. Readers must
/// consult the collection's metric before ordering raw scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Cosine,
    Euclid,
    Dot,
}

impl DistanceMetric {
    pub fn higher_is_better(self) -> bool {
        !matches!(self, DistanceMetric::Euclid)
    }
}

/// One vector plus payload, addressed by record id, as stored remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: RecordId,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// A similarity-query match returned by the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: RecordId,
    pub score: f32,
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Descriptor of an existing collection in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub vector_width: usize,
    pub metric: DistanceMetric,
    pub points: usize,
}

/// Exact-match payload filter applied during a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

/// One display-ready entry of a ranked result list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedHit {
    pub id: RecordId,
    pub score: f32,
    pub name: String,
    pub text: String,
    pub popularity: Option<f64>,
}

/// Ordered best-first result of one hybrid query. Ephemeral: lives only for
/// the duration of the call that produced it.
pub type RankedResult = Vec<RankedHit>;
