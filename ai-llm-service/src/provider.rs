//! The chat-completion capability every backend implements.

use async_trait::async_trait;

use crate::{chat::ChatMessage, error_handler::AiLlmError, token_stream::TokenStream};

/// Uniform capability shared by all providers.
///
/// Callers never branch on which backend sits behind it.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Single, non-streaming completion of `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AiLlmError>;

    /// Streaming completion. Resolves once the upstream accepted the request;
    /// the returned stream ends when the backend signals completion.
    async fn stream_complete(&self, messages: &[ChatMessage]) -> Result<TokenStream, AiLlmError>;
}
