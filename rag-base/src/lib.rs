//! Public API:
//! - [`ContextRetriever::get_context`]: embed the query, fetch the nearest
//!   chunks, render them as one source-attributed context block.
//! - [`ContextRetriever::reset_cache`]: forget the cached collection id after
//!   the index was rebuilt.
//!
//! Retrieval is best-effort: every failure is logged and degrades to an
//! empty context, never to an error.

mod embedding;
pub mod errors;
pub mod structs;
mod vector_db;

use std::sync::Arc;
use std::time::Instant;

use ai_llm_service::{
    config::llm_model_config::LlmModelConfig, services::ollama_service::OllamaService,
};
use tracing::{debug, info, warn};

pub use embedding::Embedder;
pub use errors::rag_base_error::RagBaseError;
pub use structs::rag_base_config::{ChromaConfig, DEFAULT_TOP_N, RagConfig};
pub use structs::retrieved_chunk::RetrievedChunk;
pub use vector_db::{ChromaIndex, VectorIndex};

/// Fixed instruction placed ahead of the rendered chunks.
pub const CONTEXT_PREAMBLE: &str = "You are a helpful assistant. Use the following context from the knowledge base to answer the user's question. If the context does not contain enough information to answer, say so honestly instead of guessing.\n\nContext:\n";

/// Embeds queries and pulls matching chunks from the vector index.
#[derive(Clone)]
pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_n: usize,
}

impl ContextRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, top_n: usize) -> Self {
        Self {
            embedder,
            index,
            top_n: top_n.max(1),
        }
    }

    /// Ollama embeddings with `embedding` + Chroma configured from the environment.
    pub fn from_env(embedding: LlmModelConfig) -> Result<Self, RagBaseError> {
        Self::from_config(RagConfig::from_env()?, embedding)
    }

    /// Ollama embeddings + Chroma from explicit configs.
    ///
    /// # Errors
    /// [`RagBaseError::Embedding`] when `embedding` is not a usable Ollama config.
    pub fn from_config(cfg: RagConfig, embedding: LlmModelConfig) -> Result<Self, RagBaseError> {
        let embedder = OllamaService::new(embedding)?;
        let index = ChromaIndex::new(cfg.chroma)?;
        Ok(Self::new(Arc::new(embedder), Arc::new(index), cfg.top_n))
    }

    /// Default number of chunks per query.
    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Context block for `query`, or `""` when nothing usable was found.
    ///
    /// `top_n` overrides the configured default.
    pub async fn get_context(&self, query: &str, top_n: Option<usize>) -> String {
        let top_n = top_n.unwrap_or(self.top_n).max(1);
        let started = Instant::now();

        match self.retrieve(query, top_n).await {
            Ok(chunks) if chunks.is_empty() => {
                info!(
                    target: "rag_base::retrieve",
                    top_n,
                    "no relevant chunks found; continuing without context"
                );
                String::new()
            }
            Ok(chunks) => {
                info!(
                    target: "rag_base::retrieve",
                    chunks = chunks.len(),
                    latency_ms = started.elapsed().as_millis(),
                    "context retrieved"
                );
                render_context(&chunks)
            }
            Err(e) => {
                warn!(
                    target: "rag_base::retrieve",
                    error = %e,
                    "context retrieval failed; continuing without context"
                );
                String::new()
            }
        }
    }

    /// Strict variant of [`ContextRetriever::get_context`] returning the raw chunks.
    pub async fn retrieve(&self, query: &str, top_n: usize) -> Result<Vec<RetrievedChunk>, RagBaseError> {
        let vector = self.embedder.embed(query).await?;
        debug!(
            target: "rag_base::retrieve",
            chars = query.chars().count(),
            dim = vector.len(),
            "query embedded"
        );
        self.index.query_nearest(&vector, top_n).await
    }

    /// Drops the cached collection handle; the next query re-resolves it.
    pub async fn reset_cache(&self) {
        self.index.reset_cache().await;
    }
}

impl std::fmt::Debug for ContextRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRetriever")
            .field("top_n", &self.top_n)
            .finish()
    }
}

/// Renders chunks as `[i] (source, page N)\n<text>` entries behind
/// [`CONTEXT_PREAMBLE`]. Empty input renders as `""`.
pub fn render_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let body = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let page = c
                .page_number
                .map(|p| format!(", page {p}"))
                .unwrap_or_default();
            format!("[{}] ({}{})\n{}", i + 1, c.source_id, page, c.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{CONTEXT_PREAMBLE}{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, source: &str, page: Option<u32>) -> RetrievedChunk {
        RetrievedChunk {
            text: text.into(),
            source_id: source.into(),
            page_number: page,
            distance: None,
        }
    }

    #[test]
    fn renders_numbered_source_tags() {
        let out = render_context(&[
            chunk("Alpha text.", "manual.pdf", Some(4)),
            chunk("Beta text.", "notes.pdf", None),
        ]);
        let expected = format!(
            "{CONTEXT_PREAMBLE}[1] (manual.pdf, page 4)\nAlpha text.\n\n[2] (notes.pdf)\nBeta text."
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn no_chunks_no_context() {
        assert_eq!(render_context(&[]), "");
    }

    #[test]
    fn embedding_config_drives_the_embedder() {
        use ai_llm_service::config::default_config::config_ollama_embedding;

        let cfg = RagConfig {
            top_n: 7,
            ..RagConfig::default()
        };

        let retriever = ContextRetriever::from_config(cfg.clone(), config_ollama_embedding()).unwrap();
        assert_eq!(retriever.top_n(), 7);

        let mut embedding = config_ollama_embedding();
        embedding.endpoint = "localhost:11434".into();
        let err = ContextRetriever::from_config(cfg, embedding).unwrap_err();
        assert!(matches!(err, RagBaseError::Embedding(_)));
    }
}
