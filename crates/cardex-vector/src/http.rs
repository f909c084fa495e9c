//! HTTP transport for a Qdrant-style vector index REST API.
//!
//! Error classification: network failures, HTTP 429 and 5xx map to the
//! transient (retryable) class; any other 4xx is a non-retryable service
//! rejection. Retrying is the caller's policy — this layer performs exactly
//! one request per call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use cardex_core::traits::VectorStore;
use cardex_core::types::{
    CollectionInfo, DistanceMetric, FieldFilter, ScoredPoint, VectorPoint,
};
use cardex_core::{Error, Result};

pub struct HttpVectorStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVectorStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::other)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = req
            .send()
            .await
            .map_err(|e| Error::Transient(format!("vector index request failed: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            Err(Error::Transient(format!("vector index {status}: {body}")))
        } else {
            Err(Error::Service(format!("vector index {status}: {body}")))
        }
    }
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let resp = self.send(self.client.get(self.url("/collections"))).await?;
        let parsed: ApiResponse<CollectionsResult> = resp.json().await.map_err(Error::other)?;
        Ok(parsed
            .result
            .collections
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let response = self
            .client
            .get(self.url(&format!("/collections/{name}")))
            .send()
            .await
            .map_err(|e| Error::Transient(format!("vector index request failed: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(Error::Transient(format!("vector index {status}: {body}")));
            }
            return Err(Error::Service(format!("vector index {status}: {body}")));
        }
        let parsed: ApiResponse<InfoResult> = response.json().await.map_err(Error::other)?;
        Ok(Some(CollectionInfo {
            name: name.to_string(),
            vector_width: parsed.result.config.params.vectors.size,
            metric: parsed.result.config.params.vectors.distance,
            points: parsed.result.points_count.unwrap_or(0),
        }))
    }

    async fn create_collection(
        &self,
        name: &str,
        vector_width: usize,
        metric: DistanceMetric,
    ) -> Result<()> {
        let body = CreateCollectionBody {
            vectors: VectorParams {
                size: vector_width,
                distance: metric,
            },
        };
        self.send(
            self.client
                .put(self.url(&format!("/collections/{name}")))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/collections/{name}")))
            .send()
            .await
            .map_err(|e| Error::Transient(format!("vector index request failed: {e}")))?;
        // Deleting a missing collection is a no-op, not an error.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            Err(Error::Transient(format!("vector index {status}: {body}")))
        } else {
            Err(Error::Service(format!("vector index {status}: {body}")))
        }
    }

    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<()> {
        let body = UpsertBody { points };
        // wait=true: the write is acknowledged only once durable, which is
        // what gives chunk uploads their at-least-once semantics.
        self.send(
            self.client
                .put(self.url(&format!("/collections/{name}/points?wait=true")))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        let body = SearchBody {
            vector,
            limit: top_k,
            with_payload: true,
            filter: filter.map(|f| MatchFilter {
                must: vec![MustClause {
                    key: f.field.clone(),
                    r#match: MatchValue {
                        value: f.value.clone(),
                    },
                }],
            }),
        };
        let resp = self
            .send(
                self.client
                    .post(self.url(&format!("/collections/{name}/points/search")))
                    .json(&body),
            )
            .await?;
        let parsed: ApiResponse<Vec<ScoredPoint>> = resp.json().await.map_err(Error::other)?;
        Ok(parsed.result)
    }
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionName>,
}

#[derive(Deserialize)]
struct CollectionName {
    name: String,
}

#[derive(Deserialize)]
struct InfoResult {
    config: InfoConfig,
    points_count: Option<usize>,
}

#[derive(Deserialize)]
struct InfoConfig {
    params: InfoParams,
}

#[derive(Deserialize)]
struct InfoParams {
    vectors: VectorParams,
}

#[derive(Serialize, Deserialize)]
struct VectorParams {
    size: usize,
    distance: DistanceMetric,
}

#[derive(Serialize)]
struct CreateCollectionBody {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct UpsertBody<'a> {
    points: &'a [VectorPoint],
}

#[derive(Serialize)]
struct SearchBody<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<MatchFilter>,
}

#[derive(Serialize)]
struct MatchFilter {
    must: Vec<MustClause>,
}

#[derive(Serialize)]
struct MustClause {
    key: String,
    r#match: MatchValue,
}

#[derive(Serialize)]
struct MatchValue {
    value: String,
}
