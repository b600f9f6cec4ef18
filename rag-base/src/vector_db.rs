//! Nearest-neighbour queries against Chroma over its HTTP API.
//!
//! - `GET  {url}/api/v1/collections/{name}`     — resolve the collection id
//! - `POST {url}/api/v1/collections/{id}/query` — top-N nearest chunks
//!
//! The collection id is resolved lazily and cached for the process lifetime.
//! [`VectorIndex::reset_cache`] drops it so that a rebuilt collection is
//! picked up without a restart.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    errors::rag_base_error::RagBaseError,
    structs::{rag_base_config::ChromaConfig, retrieved_chunk::RetrievedChunk},
};

/// Read side of the document index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `top_n` chunks nearest to `vector`, in the order the index returns them.
    async fn query_nearest(
        &self,
        vector: &[f32],
        top_n: usize,
    ) -> Result<Vec<RetrievedChunk>, RagBaseError>;

    /// Forgets any cached handle to the underlying collection.
    async fn reset_cache(&self);
}

#[derive(Debug)]
pub struct ChromaIndex {
    client: reqwest::Client,
    cfg: ChromaConfig,
    collection_id: RwLock<Option<String>>,
}

impl ChromaIndex {
    pub fn new(cfg: ChromaConfig) -> Result<Self, RagBaseError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            cfg,
            collection_id: RwLock::new(None),
        })
    }

    fn base(&self) -> &str {
        self.cfg.url.trim_end_matches('/')
    }

    /// Cached collection id, resolving it on first use.
    ///
    /// Two concurrent first calls may both hit Chroma; both store the same id.
    async fn collection_id(&self) -> Result<String, RagBaseError> {
        if let Some(id) = self.collection_id.read().await.as_ref() {
            return Ok(id.clone());
        }

        let url = format!("{}/api/v1/collections/{}", self.base(), self.cfg.collection);
        debug!(target: "rag_base::index", "GET {}", url);
        let resp = self.client.get(&url).send().await?;
        let resp = check_status(&url, resp).await?;

        let collection: CollectionInfo = resp
            .json()
            .await
            .map_err(|e| RagBaseError::ChromaDecode(format!("collection lookup: {e}")))?;

        info!(
            target: "rag_base::index",
            collection = %self.cfg.collection,
            id = %collection.id,
            "connected to chroma collection"
        );
        *self.collection_id.write().await = Some(collection.id.clone());
        Ok(collection.id)
    }
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn query_nearest(
        &self,
        vector: &[f32],
        top_n: usize,
    ) -> Result<Vec<RetrievedChunk>, RagBaseError> {
        let id = self.collection_id().await?;
        let url = format!("{}/api/v1/collections/{}/query", self.base(), id);

        let body = QueryRequest {
            query_embeddings: [vector],
            n_results: top_n,
            include: ["documents", "metadatas", "distances"],
        };

        debug!(target: "rag_base::index", n_results = top_n, "POST {}", url);
        let resp = self.client.post(&url).json(&body).send().await?;
        let resp = check_status(&url, resp).await?;

        let out: QueryResponse = resp
            .json()
            .await
            .map_err(|e| RagBaseError::ChromaDecode(format!("query result: {e}")))?;

        Ok(out.into_chunks())
    }

    async fn reset_cache(&self) {
        let previous = self.collection_id.write().await.take();
        info!(
            target: "rag_base::index",
            collection = %self.cfg.collection,
            had_id = previous.is_some(),
            "collection id cache cleared"
        );
    }
}

async fn check_status(url: &str, resp: reqwest::Response) -> Result<reqwest::Response, RagBaseError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".into());
    Err(RagBaseError::ChromaStatus {
        status,
        url: url.to_string(),
        body: body.chars().take(240).collect(),
    })
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query_embeddings: [&'a [f32]; 1],
    n_results: usize,
    include: [&'static str; 3],
}

/// Chroma returns one inner list per query embedding; we always send one.
#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl QueryResponse {
    fn into_chunks(self) -> Vec<RetrievedChunk> {
        let documents = first_query(self.documents);
        let metadatas = first_query(self.metadatas);
        let distances = first_query(self.distances);

        documents
            .into_iter()
            .enumerate()
            .map(|(i, doc)| {
                RetrievedChunk::from_parts(
                    doc.unwrap_or_default(),
                    metadatas.get(i).and_then(Option::as_ref),
                    distances.get(i).copied().flatten(),
                )
            })
            .collect()
    }
}

fn first_query<T>(lists: Option<Vec<Vec<T>>>) -> Vec<T> {
    lists
        .and_then(|outer| outer.into_iter().next())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_response_aligns_parallel_lists() {
        let raw = json!({
            "ids": [["a", "b"]],
            "documents": [["first chunk", null]],
            "metadatas": [[{ "source": "doc.pdf", "page": 2 }, null]],
            "distances": [[0.12, 0.34]]
        });
        let resp: QueryResponse = serde_json::from_value(raw).unwrap();
        let chunks = resp.into_chunks();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source_id, "doc.pdf");
        assert_eq!(chunks[0].page_number, Some(2));
        assert_eq!(chunks[1].text, "");
        assert_eq!(chunks[1].source_id, "unknown");
        assert_eq!(chunks[1].distance, Some(0.34));
    }

    #[test]
    fn empty_query_response_has_no_chunks() {
        let resp: QueryResponse = serde_json::from_value(json!({})).unwrap();
        assert!(resp.into_chunks().is_empty());
    }
}
