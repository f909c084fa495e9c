//! Deterministic in-process vector store used as the test double for the
//! remote index.
//!
//! Scoring is exact (no ANN approximation), ties keep insertion order, and
//! transient upsert failures can be injected to exercise the retry path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use cardex_core::traits::VectorStore;
use cardex_core::types::{
    CollectionInfo, DistanceMetric, FieldFilter, ScoredPoint, VectorPoint,
};
use cardex_core::{Error, Result};

#[derive(Default)]
pub struct MemoryVectorStore {
    collections: Mutex<HashMap<String, MemCollection>>,
    /// Upserts left to fail with an injected transient error.
    fail_upserts: AtomicUsize,
    create_calls: AtomicUsize,
}

struct MemCollection {
    vector_width: usize,
    metric: DistanceMetric,
    /// Insertion order preserved so equal scores resolve deterministically.
    points: Vec<VectorPoint>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` upsert calls fail with a transient error.
    pub fn fail_next_upserts(&self, n: usize) {
        self.fail_upserts.store(n, Ordering::SeqCst);
    }

    /// Number of `create_collection` calls observed.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Point count of a collection, 0 when absent.
    pub fn point_count(&self, name: &str) -> usize {
        self.collections
            .lock()
            .map(|c| c.get(name).map(|col| col.points.len()).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.lock().map_err(|_| poisoned())?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let collections = self.collections.lock().map_err(|_| poisoned())?;
        Ok(collections.get(name).map(|col| CollectionInfo {
            name: name.to_string(),
            vector_width: col.vector_width,
            metric: col.metric,
            points: col.points.len(),
        }))
    }

    async fn create_collection(
        &self,
        name: &str,
        vector_width: usize,
        metric: DistanceMetric,
    ) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.lock().map_err(|_| poisoned())?;
        if collections.contains_key(name) {
            return Err(Error::Service(format!("collection '{name}' already exists")));
        }
        collections.insert(
            name.to_string(),
            MemCollection {
                vector_width,
                metric,
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.lock().map_err(|_| poisoned())?;
        collections.remove(name);
        Ok(())
    }

    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<()> {
        if self
            .fail_upserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Transient("injected upsert failure".to_string()));
        }
        let mut collections = self.collections.lock().map_err(|_| poisoned())?;
        let col = collections
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("collection '{name}'")))?;
        for point in points {
            if point.vector.len() != col.vector_width {
                return Err(Error::Service(format!(
                    "point '{}' width {} does not match collection width {}",
                    point.id,
                    point.vector.len(),
                    col.vector_width
                )));
            }
            match col.points.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point.clone(),
                None => col.points.push(point.clone()),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.lock().map_err(|_| poisoned())?;
        let col = collections
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("collection '{name}'")))?;

        let mut scored: Vec<ScoredPoint> = col
            .points
            .iter()
            .filter(|p| matches_filter(p, filter))
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: score(col.metric, vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        if col.metric.higher_is_better() {
            scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        } else {
            scored.sort_by(|a, b| a.score.total_cmp(&b.score));
        }
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn matches_filter(point: &VectorPoint, filter: Option<&FieldFilter>) -> bool {
    match filter {
        None => true,
        Some(f) => point
            .payload
            .get(&f.field)
            .and_then(|v| v.as_str())
            .is_some_and(|v| v == f.value),
    }
}

fn score(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Dot => dot(a, b),
        DistanceMetric::Cosine => {
            let na = dot(a, a).sqrt();
            let nb = dot(b, b).sqrt();
            if na == 0.0 || nb == 0.0 {
                0.0
            } else {
                dot(a, b) / (na * nb)
            }
        }
        DistanceMetric::Euclid => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn poisoned() -> Error {
    Error::Service("memory store lock poisoned".to_string())
}
