//! Unified error type for the rag-base crate.

use ai_llm_service::AiLlmError;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors produced by the RAG base module.
///
/// None of these reach HTTP clients: [`crate::ContextRetriever::get_context`]
/// logs them and degrades to an empty context.
#[derive(Debug, Error)]
pub enum RagBaseError {
    // ── Configuration / environment ──────────────────────────────────────────
    /// Failed to parse an environment variable into the expected type.
    #[error("failed to parse env variable: {key} = '{value}'")]
    EnvParse { key: String, value: String },

    /// Configuration combination is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Embeddings backend ──────────────────────────────────────────────────
    /// Embedding backend failed or returned an unusable vector.
    #[error("embedding error: {0}")]
    Embedding(#[from] AiLlmError),

    // ── Chroma client / transport ───────────────────────────────────────────
    /// Transport failure talking to Chroma.
    #[error("chroma transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Chroma answered with a non-success status.
    #[error("chroma returned {status} for {url}: {body}")]
    ChromaStatus {
        status: StatusCode,
        url: String,
        body: String,
    },

    /// Chroma payload did not have the expected shape.
    #[error("unexpected chroma response: {0}")]
    ChromaDecode(String),
}
