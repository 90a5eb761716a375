//! Client for a hosted vector index (Pinecone-style data plane).

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector index request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("vector index returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Payload stored next to every vector.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VectorMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub sheet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<VectorMetadata>,
}

pub trait VectorIndexClient: Send + Sync {
    fn upsert(&self, records: &[VectorRecord]) -> Result<usize, IndexError>;
    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>, IndexError>;
    fn delete(&self, ids: &[String]) -> Result<(), IndexError>;
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    namespace: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    namespace: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<IndexMatch>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
    namespace: &'a str,
}

pub struct HttpVectorIndex {
    client: reqwest::blocking::Client,
    base_url: String,
    namespace: String,
    api_key: Option<String>,
}

impl HttpVectorIndex {
    pub fn new(
        base_url: &str,
        namespace: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.strip_suffix('/').unwrap_or(base_url).to_string(),
            namespace: namespace.to_string(),
            api_key,
        })
    }

    fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::blocking::Response, IndexError> {
        let url = format!("{}{path}", self.base_url);
        log::debug!("POST {url}");

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Api-Key", key);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Api {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }

        Ok(response)
    }
}

impl VectorIndexClient for HttpVectorIndex {
    fn upsert(&self, records: &[VectorRecord]) -> Result<usize, IndexError> {
        if records.is_empty() {
            return Ok(0);
        }

        let response = self.post(
            "/vectors/upsert",
            &UpsertRequest {
                vectors: records,
                namespace: &self.namespace,
            },
        )?;

        Ok(response.json::<UpsertResponse>()?.upserted_count)
    }

    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>, IndexError> {
        let response = self.post(
            "/query",
            &QueryRequest {
                vector,
                top_k,
                include_metadata: true,
                namespace: &self.namespace,
            },
        )?;

        Ok(response.json::<QueryResponse>()?.matches)
    }

    fn delete(&self, ids: &[String]) -> Result<(), IndexError> {
        if ids.is_empty() {
            return Ok(());
        }

        self.post(
            "/vectors/delete",
            &DeleteRequest {
                ids,
                namespace: &self.namespace,
            },
        )?;

        Ok(())
    }
}
