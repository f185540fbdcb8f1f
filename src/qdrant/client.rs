//! HTTP client wrapper for writing chunk vectors into Qdrant.

use crate::processing::ChunkRecord;
use crate::qdrant::payload::{build_point, current_timestamp_rfc3339};
use crate::qdrant::types::QdrantError;
use crate::storage::{VectorIndex, VectorIndexError};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::json;

/// Qdrant-backed [`VectorIndex`] bound to one collection.
pub struct QdrantVectorIndex {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection: String,
    pub(crate) vector_size: usize,
}

impl QdrantVectorIndex {
    /// Construct a client for `collection` at `url`.
    pub fn new(
        url: &str,
        collection: impl Into<String>,
        api_key: Option<String>,
        vector_size: usize,
    ) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("docflow/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        let collection = collection.into();
        tracing::debug!(
            url = %base_url,
            collection = %collection,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            collection,
            vector_size,
        })
    }

    /// Create the collection when it is missing.
    pub async fn ensure_collection(&self) -> Result<(), QdrantError> {
        if self.collection_exists().await? {
            tracing::debug!(collection = %self.collection, "Collection already present");
            return Ok(());
        }

        tracing::info!(
            collection = %self.collection,
            vector_size = self.vector_size,
            "Creating collection"
        );
        let body = json!({
            "vectors": {
                "size": self.vector_size,
                "distance": "Cosine"
            }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await
    }

    /// Upsert `records` as points in a single request, waiting for the write to apply.
    pub async fn upsert_points(&self, records: &[ChunkRecord]) -> Result<(), QdrantError> {
        if let Some(record) = records
            .iter()
            .find(|record| record.embedding.len() != self.vector_size)
        {
            return Err(QdrantError::DimensionMismatch {
                chunk_id: record.metadata.chunk_id,
                expected: self.vector_size,
                actual: record.embedding.len(),
            });
        }

        let indexed_at = current_timestamp_rfc3339();
        let points: Vec<_> = records
            .iter()
            .map(|record| build_point(record, &indexed_at))
            .collect();

        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;
        ensure_success(response).await?;

        tracing::debug!(
            collection = %self.collection,
            points = records.len(),
            "Points upserted"
        );
        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<(), VectorIndexError> {
        self.upsert_points(records).await.map_err(VectorIndexError::from)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<(), QdrantError> {
    if response.status().is_success() {
        Ok(())
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = QdrantError::UnexpectedStatus { status, body };
        tracing::error!(error = %error, "Qdrant request failed");
        Err(error)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::ChunkMetadata;
    use httpmock::{
        Method::{GET, PUT},
        MockServer,
    };

    fn index(server: &MockServer, api_key: Option<&str>) -> QdrantVectorIndex {
        QdrantVectorIndex::new(
            &server.base_url(),
            "docs",
            api_key.map(str::to_string),
            2,
        )
        .expect("client")
    }

    fn record(chunk_id: usize, content: &str, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            content: content.into(),
            embedding,
            metadata: ChunkMetadata {
                chunk_id,
                source: Some("folder".into()),
                file_name: Some("a.txt".into()),
            },
        }
    }

    #[tokio::test]
    async fn ensure_collection_creates_missing_collection() {
        let server = MockServer::start_async().await;
        let lookup = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/docs");
                then.status(404).body("not found");
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs")
                    .json_body(json!({ "vectors": { "size": 2, "distance": "Cosine" } }));
                then.status(200).json_body(json!({ "result": true, "status": "ok" }));
            })
            .await;

        index(&server, None).ensure_collection().await.expect("ensure");

        lookup.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn ensure_collection_skips_existing_collection() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/docs");
                then.status(200).json_body(json!({ "result": {}, "status": "ok" }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs");
                then.status(200);
            })
            .await;

        index(&server, None).ensure_collection().await.expect("ensure");

        create.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn upsert_sends_single_batch_with_api_key() {
        let server = MockServer::start_async().await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs/points")
                    .query_param("wait", "true")
                    .header("api-key", "secret")
                    .body_contains("\"content\":\"first\"")
                    .body_contains("\"content\":\"second\"");
                then.status(200).json_body(json!({ "status": "ok" }));
            })
            .await;

        let records = vec![
            record(0, "first", vec![0.1, 0.2]),
            record(1, "second", vec![0.3, 0.4]),
        ];
        index(&server, Some("secret"))
            .upsert(&records)
            .await
            .expect("upsert");

        upsert.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension_without_request() {
        let server = MockServer::start_async().await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs/points");
                then.status(200);
            })
            .await;

        let error = index(&server, None)
            .upsert_points(&[record(4, "bad", vec![0.1])])
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            QdrantError::DimensionMismatch {
                chunk_id: 4,
                expected: 2,
                actual: 1
            }
        ));
        upsert.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn upsert_surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs/points");
                then.status(500).body("boom");
            })
            .await;

        let error = index(&server, None)
            .upsert_points(&[record(0, "x", vec![0.1, 0.2])])
            .await
            .unwrap_err();

        assert!(matches!(error, QdrantError::UnexpectedStatus { body, .. } if body == "boom"));
    }

    #[test]
    fn endpoint_formatting_trims_slashes() {
        assert_eq!(
            format_endpoint("http://localhost:6333/", "/collections/docs"),
            "http://localhost:6333/collections/docs"
        );
    }
}
