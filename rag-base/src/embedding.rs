//! Query embedding capability.

use ai_llm_service::services::ollama_service::OllamaService;
use async_trait::async_trait;

use crate::errors::rag_base_error::RagBaseError;

/// Turns text into a vector in the same space as the indexed chunks.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagBaseError>;
}

/// Ollama `/api/embeddings` with the configured embedding model.
#[async_trait]
impl Embedder for OllamaService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagBaseError> {
        Ok(self.embeddings(text).await?)
    }
}
