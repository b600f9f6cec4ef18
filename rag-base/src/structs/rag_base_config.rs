//! Configuration layer: reads runtime settings for the vector index and
//! retrieval from environment variables.

use serde::{Deserialize, Serialize};

use crate::errors::rag_base_error::RagBaseError;

/// Default number of chunks handed to the model.
pub const DEFAULT_TOP_N: usize = 5;

/// Chroma connectivity parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromaConfig {
    /// HTTP base URL (e.g., "http://localhost:8000").
    pub url: String,
    /// Collection holding the ingested document chunks.
    pub collection: String,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            collection: "pdf-documents".to_string(),
        }
    }
}

/// Top-level runtime configuration for retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagConfig {
    pub chroma: ChromaConfig,
    /// Chunks requested per query.
    pub top_n: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chroma: ChromaConfig::default(),
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl RagConfig {
    /// Build configuration from environment variables.
    ///
    /// Environment variables used:
    /// - `CHROMA_URL` (default: "http://localhost:8000")
    /// - `CHROMA_COLLECTION` (default: "pdf-documents")
    /// - `RAG_TOP_N` (default: 5)
    pub fn from_env() -> Result<Self, RagBaseError> {
        let defaults = Self::default();

        let chroma = ChromaConfig {
            url: read_string_env("CHROMA_URL").unwrap_or(defaults.chroma.url),
            collection: read_string_env("CHROMA_COLLECTION").unwrap_or(defaults.chroma.collection),
        };
        let top_n = read_usize_env("RAG_TOP_N")?.unwrap_or(defaults.top_n);

        if top_n == 0 {
            return Err(RagBaseError::InvalidConfig("RAG_TOP_N must be > 0".into()));
        }
        if !(chroma.url.starts_with("http://") || chroma.url.starts_with("https://")) {
            return Err(RagBaseError::InvalidConfig(format!(
                "CHROMA_URL must start with http:// or https://, got {:?}",
                chroma.url
            )));
        }

        Ok(Self { chroma, top_n })
    }
}

fn read_string_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read an optional `usize` from env, with error mapped to `RagBaseError`.
fn read_usize_env(key: &str) -> Result<Option<usize>, RagBaseError> {
    match read_string_env(key) {
        Some(v) => v
            .parse::<usize>()
            .map(Some)
            .map_err(|_| RagBaseError::EnvParse {
                key: key.into(),
                value: v,
            }),
        None => Ok(None),
    }
}
