//! Deterministic bag-of-words embedder for tests and offline development.

use async_trait::async_trait;

use cardex_core::traits::Embedder;
use cardex_core::Result;

/// Hash-based embedder: each lower-cased token is hashed into one slot of
/// the output vector, and the result is L2-normalized. No semantics beyond
/// token overlap, but fully deterministic, which is exactly what index and
/// query tests need — identical texts map to identical vectors, and texts
/// sharing tokens land closer than disjoint ones under cosine similarity.
pub struct HashEmbedder {
    width: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            id: format!("fake:hash:d{width}"),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;

        let mut v = vec![0f32; self.width];
        for (i, raw) in text.split_whitespace().enumerate() {
            let token: String = raw
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if token.is_empty() {
                continue;
            }
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.width;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn width(&self) -> usize {
        self.width
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
