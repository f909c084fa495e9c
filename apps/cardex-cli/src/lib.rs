//! Shared plumbing for the cardex binaries: configuration-driven wiring of
//! the pipeline and the JSONL record loader standing in for the excluded
//! CSV/column-selection layer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use cardex_core::config::Config;
use cardex_core::types::{CardRecord, DistanceMetric};
use cardex_embed::{default_embedder, EmbedConfig};
use cardex_hybrid::{CatalogPipeline, PipelineConfig};
use cardex_vector::{HttpVectorStore, UploadOptions};

/// Read one `CardRecord` per line; blank lines are skipped.
pub fn load_records(path: &Path) -> anyhow::Result<Vec<CardRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading records from {}", path.display()))?;
    let mut records = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: CardRecord = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: malformed record", path.display(), lineno + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Wire a pipeline against the configured embedding service and vector
/// index. All knobs come from `config.toml` / `APP_*` env vars with
/// development defaults.
pub fn build_pipeline(config: &Config) -> anyhow::Result<CatalogPipeline> {
    let embed = EmbedConfig {
        base_url: config
            .get("embedding.url")
            .unwrap_or_else(|_| EmbedConfig::default().base_url),
        model: config
            .get("embedding.model")
            .unwrap_or_else(|_| EmbedConfig::default().model),
        width: config.get("embedding.width").unwrap_or(768),
        timeout_secs: config.get("embedding.timeout_secs").unwrap_or(30),
        max_retries: config.get("embedding.max_retries").unwrap_or(3),
    };
    let embedder = default_embedder(embed)?;

    let index_url: String = config
        .get("index.url")
        .unwrap_or_else(|_| "http://localhost:6333".to_string());
    let timeout_secs: u64 = config.get("index.timeout_secs").unwrap_or(30);
    let store = HttpVectorStore::new(&index_url, Duration::from_secs(timeout_secs))?;

    let pipeline_config = PipelineConfig {
        collection: config
            .get("index.collection")
            .unwrap_or_else(|_| "cards".to_string()),
        categorical_fields: config
            .get("index.categorical_fields")
            .unwrap_or_else(|_| vec!["rarity".to_string(), "colorIdentity".to_string()]),
        metric: DistanceMetric::Cosine,
        upload: UploadOptions {
            batch_size: config.get("index.batch_size").unwrap_or(128),
            parallelism: config.get("index.parallelism").unwrap_or(4),
            max_retries: config.get("index.max_retries").unwrap_or(3),
            retry_base: Duration::from_millis(500),
        },
    };

    Ok(CatalogPipeline::new(
        embedder,
        Arc::new(store),
        pipeline_config,
    ))
}

/// Where the active vocabulary is persisted between the indexer and search
/// binaries.
pub fn vocab_path(config: &Config) -> std::path::PathBuf {
    let raw: String = config
        .get("index.vocab_path")
        .unwrap_or_else(|_| "vocabulary.json".to_string());
    cardex_core::config::expand_path(raw)
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
