//! Lightweight Ollama service for chat and embeddings.
//!
//! This module implements a thin client for the local Ollama API:
//! - `POST {endpoint}/api/chat`       — chat completion (`stream=false` or NDJSON stream)
//! - `POST {endpoint}/api/embeddings` — embeddings retrieval
//!
//! # Examples
//!
//! ```no_run
//! use ai_llm_service::chat::ChatMessage;
//! use ai_llm_service::config::default_config::config_ollama_chat;
//! use ai_llm_service::services::ollama_service::OllamaService;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let svc = OllamaService::new(config_ollama_chat(120, None))?;
//!
//! let text = svc.chat(&[ChatMessage::user("Write a haiku about Rust.")]).await?;
//! println!("Generated:\n{}", text);
//! # Ok(()) }
//! ```

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    chat::{ChatMessage, WireMessage},
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{AiLlmError, ConfigError, ProviderError, ProviderErrorKind},
    provider::ChatProvider,
    services::{
        decode_error, ensure_success,
        stream_decoder::{Frame, pump},
        timeout_of, validate_endpoint,
    },
    token_stream::TokenStream,
};

/// Thin client for Ollama.
///
/// Initialized with a full [`LlmModelConfig`]. Reuses an HTTP client with
/// a configurable timeout.
#[derive(Debug)]
pub struct OllamaService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_chat: String,
    url_embeddings: String,
}

impl OllamaService {
    /// Creates a new [`OllamaService`] from the given config.
    ///
    /// # Errors
    /// - [`ConfigError::ProviderMisconfigured`] if the provider is not Ollama or
    ///   the endpoint is invalid
    /// - [`AiLlmError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        if cfg.provider != LlmProvider::Ollama {
            return Err(ConfigError::ProviderMisconfigured {
                provider: LlmProvider::Ollama,
                reason: format!("config targets {}", cfg.provider),
            }
            .into());
        }
        validate_endpoint(&cfg)?;

        let client = reqwest::Client::builder()
            .timeout(timeout_of(&cfg))
            .gzip(true)
            .brotli(true)
            .build()?;

        let base = cfg.base_url().to_string();
        let url_chat = format!("{}/api/chat", base);
        let url_embeddings = format!("{}/api/embeddings", base);

        info!(
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            "OllamaService initialized"
        );

        Ok(Self {
            client,
            cfg,
            url_chat,
            url_embeddings,
        })
    }

    pub fn config(&self) -> &LlmModelConfig {
        &self.cfg
    }

    /// Performs a **non-streaming** chat request via `/api/chat`.
    ///
    /// # Errors
    /// - `HttpStatus` for non-2xx responses
    /// - [`AiLlmError::HttpTransport`] for client errors
    /// - `Decode` if the response cannot be parsed
    #[instrument(skip_all, fields(model = %self.cfg.model, turns = messages.len()))]
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, AiLlmError> {
        let started = Instant::now();
        let body = ChatRequest::from_cfg(&self.cfg, messages, false);

        debug!("POST {}", self.url_chat);
        let resp = self.client.post(&self.url_chat).json(&body).send().await?;
        let resp = ensure_success(LlmProvider::Ollama, &self.url_chat, resp).await?;

        let out: ChatResponse = resp.json().await.map_err(|e| {
            decode_error(
                LlmProvider::Ollama,
                format!("serde error: {e}; expected `message.content`"),
            )
        })?;

        if let Some(err) = out.error {
            return Err(
                ProviderError::new(LlmProvider::Ollama, ProviderErrorKind::Upstream(err)).into(),
            );
        }

        info!(
            latency_ms = started.elapsed().as_millis(),
            "ollama chat completed"
        );
        Ok(out.message.map(|m| m.content).unwrap_or_default())
    }

    /// Opens a streaming chat request via `/api/chat` and returns its chunks.
    ///
    /// Each NDJSON line carries `message.content`; the line with
    /// `done: true` ends the stream.
    #[instrument(skip_all, fields(model = %self.cfg.model, turns = messages.len()))]
    pub async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, AiLlmError> {
        let body = ChatRequest::from_cfg(&self.cfg, messages, true);

        debug!("POST {} (stream)", self.url_chat);
        let resp = self.client.post(&self.url_chat).json(&body).send().await?;
        let resp = ensure_success(LlmProvider::Ollama, &self.url_chat, resp).await?;

        Ok(TokenStream::spawn(move |tx| {
            pump(LlmProvider::Ollama, resp, tx, decode_ndjson_line)
        }))
    }

    /// Retrieves embeddings via `/api/embeddings`.
    ///
    /// An absent or empty `embedding` array is treated as a malformed response.
    ///
    /// # Errors
    /// - `HttpStatus` for non-2xx responses
    /// - [`AiLlmError::HttpTransport`] for client errors
    /// - `Decode` if the response cannot be parsed
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn embeddings(&self, input: &str) -> Result<Vec<f32>, AiLlmError> {
        let body = EmbeddingsRequest {
            model: &self.cfg.model,
            prompt: input,
        };

        debug!("POST {}", self.url_embeddings);
        let resp = self
            .client
            .post(&self.url_embeddings)
            .json(&body)
            .send()
            .await?;
        let resp = ensure_success(LlmProvider::Ollama, &self.url_embeddings, resp).await?;

        let out: EmbeddingsResponse = resp.json().await.map_err(|e| {
            decode_error(
                LlmProvider::Ollama,
                format!("serde error: {e}; expected `{{ embedding: number[] }}`"),
            )
        })?;

        match out.embedding {
            Some(v) if !v.is_empty() => {
                debug!(
                    chars = input.chars().count(),
                    dim = v.len(),
                    "embedded text"
                );
                Ok(v)
            }
            _ => Err(decode_error(
                LlmProvider::Ollama,
                "Ollama returned an invalid embedding response",
            )),
        }
    }
}

#[async_trait]
impl ChatProvider for OllamaService {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AiLlmError> {
        self.chat(messages).await
    }

    async fn stream_complete(&self, messages: &[ChatMessage]) -> Result<TokenStream, AiLlmError> {
        self.chat_stream(messages).await
    }
}

/// Decodes one NDJSON line of a streaming `/api/chat` response.
pub(crate) fn decode_ndjson_line(line: &str) -> Result<Frame, ProviderErrorKind> {
    let parsed: ChatResponse = serde_json::from_str(line)
        .map_err(|e| ProviderErrorKind::Decode(format!("invalid NDJSON line: {e}")))?;

    if let Some(err) = parsed.error {
        return Err(ProviderErrorKind::Upstream(err));
    }
    if parsed.done {
        return Ok(match parsed.message {
            Some(m) if !m.content.is_empty() => Frame::Final(m.content),
            _ => Frame::Done,
        });
    }
    Ok(match parsed.message {
        Some(m) if !m.content.is_empty() => Frame::Chunk(m.content),
        _ => Frame::Skip,
    })
}

/* ==========================
HTTP payloads & options
========================== */

/// Request body for `/api/chat`.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

impl<'a> ChatRequest<'a> {
    /// Builds a request from config and conversation.
    fn from_cfg(cfg: &'a LlmModelConfig, messages: &'a [ChatMessage], stream: bool) -> Self {
        let options = ChatOptions {
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            num_predict: cfg.max_tokens,
        };

        Self {
            model: &cfg.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            stream,
            options: Some(options),
        }
    }
}

/// Subset of Ollama `options`.
#[derive(Debug, Default, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Response body (or one NDJSON line) of `/api/chat`.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessageOut>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    #[serde(default)]
    content: String,
}

/// Request body for `/api/embeddings`.
#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Response body for `/api/embeddings`.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config::config_ollama_chat;

    #[test]
    fn ndjson_lines() {
        assert_eq!(
            decode_ndjson_line(r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#)
                .unwrap(),
            Frame::Chunk("Hi".into())
        );
        assert_eq!(
            decode_ndjson_line(r#"{"message":{"role":"assistant","content":""},"done":true}"#)
                .unwrap(),
            Frame::Done
        );
        assert!(matches!(
            decode_ndjson_line(r#"{"error":"model not found"}"#),
            Err(ProviderErrorKind::Upstream(m)) if m == "model not found"
        ));
        assert!(matches!(
            decode_ndjson_line("not json"),
            Err(ProviderErrorKind::Decode(_))
        ));
    }

    #[test]
    fn rejects_endpoint_without_scheme() {
        let mut cfg = config_ollama_chat(120, None);
        cfg.endpoint = "localhost:11434".into();
        let err = OllamaService::new(cfg).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("misconfigured"));
    }

    #[test]
    fn request_carries_options_and_roles() {
        let cfg = config_ollama_chat(120, Some(64));
        let msgs = vec![ChatMessage::system("ctx"), ChatMessage::user("q")];
        let body = serde_json::to_value(ChatRequest::from_cfg(&cfg, &msgs, true)).unwrap();
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "q");
        assert_eq!(body["options"]["num_predict"], 64);
    }
}
