//! OpenAI (ChatGPT) service for chat completions.
//!
//! Endpoints are derived from `LlmModelConfig::endpoint`:
//! - POST {endpoint}/v1/chat/completions: chat completion, plain or SSE stream
//!
//! Constructor validation:
//! - `cfg.provider` must be `LlmProvider::OpenAI`
//! - `cfg.api_key` must be present
//! - `cfg.endpoint` must start with http:// or https://
//!
//! Errors are normalized via unified error types in `error_handler`.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::{
    chat::{ChatMessage, WireMessage},
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{AiLlmError, ConfigError, ProviderError, ProviderErrorKind},
    provider::ChatProvider,
    services::{
        decode_error, ensure_success,
        stream_decoder::{Frame, pump, sse_data},
        timeout_of, validate_endpoint,
    },
    token_stream::TokenStream,
};

/// Thin client for the OpenAI API (ChatGPT).
///
/// Constructed from a complete [`LlmModelConfig`]. Internally keeps a
/// preconfigured `reqwest::Client` (with timeout and default headers).
#[derive(Debug)]
pub struct OpenAiService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_chat: String,
}

impl OpenAiService {
    /// Creates a new [`OpenAiService`] from the given config.
    ///
    /// # Errors
    /// - [`ConfigError::ProviderMisconfigured`] if the provider is not OpenAI,
    ///   the API key is missing, or the endpoint is invalid
    /// - [`AiLlmError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        // 1) Provider must be OpenAI.
        if cfg.provider != LlmProvider::OpenAI {
            return Err(misconfigured(format!("config targets {}", cfg.provider)));
        }

        // 2) API key must be present.
        if !cfg.api_key_present() {
            return Err(misconfigured(
                "OPENAI_API_KEY is required for the openai provider",
            ));
        }
        let api_key = cfg.api_key.clone().unwrap_or_default();

        // 3) Endpoint must use http/https.
        validate_endpoint(&cfg)?;

        // 4) HTTP client: timeout + default headers.
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
                .map_err(|e| misconfigured(format!("invalid API key header: {e}")))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout_of(&cfg))
            .default_headers(headers)
            .build()?;

        let url_chat = format!("{}/v1/chat/completions", cfg.base_url());

        info!(
            provider = %cfg.provider,
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            timeout_secs = timeout_of(&cfg).as_secs(),
            "OpenAiService initialized"
        );

        Ok(Self {
            client,
            cfg,
            url_chat,
        })
    }

    /// Performs a **non-streaming** chat completion request.
    ///
    /// # Errors
    /// - `HttpStatus` for non-2xx responses
    /// - [`AiLlmError::HttpTransport`] for client/network failures
    /// - `Decode` if the JSON cannot be parsed
    /// - `EmptyChoices` if no choices are returned
    #[instrument(skip_all, fields(model = %self.cfg.model, turns = messages.len()))]
    pub async fn generate(&self, messages: &[ChatMessage]) -> Result<String, AiLlmError> {
        let started = Instant::now();
        let body = ChatCompletionRequest::from_cfg(&self.cfg, messages, false);

        debug!(
            model = %self.cfg.model,
            turns = messages.len(),
            "POST {}", self.url_chat
        );

        let resp = self.client.post(&self.url_chat).json(&body).send().await?;
        let resp = ensure_success(LlmProvider::OpenAI, &self.url_chat, resp).await?;

        let out: ChatCompletionResponse = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                error!(
                    error = %e,
                    model = %self.cfg.model,
                    latency_ms = started.elapsed().as_millis(),
                    "failed to decode /v1/chat/completions response"
                );
                return Err(decode_error(
                    LlmProvider::OpenAI,
                    format!("serde error: {e}; expected `choices[0].message.content`"),
                ));
            }
        };

        let content = out
            .choices
            .into_iter()
            .find_map(|c| c.message.and_then(|m| m.content))
            .ok_or_else(|| ProviderError::new(LlmProvider::OpenAI, ProviderErrorKind::EmptyChoices))?;

        info!(
            model = %self.cfg.model,
            latency_ms = started.elapsed().as_millis(),
            "chat completion completed"
        );

        Ok(content)
    }

    /// Opens a streaming chat completion (`stream: true`).
    ///
    /// Each SSE `data:` line carries `choices[0].delta.content`; `data: [DONE]`
    /// ends the stream.
    #[instrument(skip_all, fields(model = %self.cfg.model, turns = messages.len()))]
    pub async fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, AiLlmError> {
        let body = ChatCompletionRequest::from_cfg(&self.cfg, messages, true);

        debug!(
            model = %self.cfg.model,
            turns = messages.len(),
            "POST {} (stream)", self.url_chat
        );

        let resp = self.client.post(&self.url_chat).json(&body).send().await?;
        let resp = ensure_success(LlmProvider::OpenAI, &self.url_chat, resp).await?;

        Ok(TokenStream::spawn(move |tx| {
            pump(LlmProvider::OpenAI, resp, tx, decode_sse_line)
        }))
    }
}

#[async_trait]
impl ChatProvider for OpenAiService {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AiLlmError> {
        self.generate(messages).await
    }

    async fn stream_complete(&self, messages: &[ChatMessage]) -> Result<TokenStream, AiLlmError> {
        self.generate_stream(messages).await
    }
}

fn misconfigured(reason: impl Into<String>) -> AiLlmError {
    ConfigError::ProviderMisconfigured {
        provider: LlmProvider::OpenAI,
        reason: reason.into(),
    }
    .into()
}

/// Decodes one SSE line of a streaming chat completion.
pub(crate) fn decode_sse_line(line: &str) -> Result<Frame, ProviderErrorKind> {
    let Some(data) = sse_data(line) else {
        return Ok(Frame::Skip);
    };
    if data == "[DONE]" {
        return Ok(Frame::Done);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| ProviderErrorKind::Decode(format!("invalid SSE payload: {e}")))?;

    if let Some(err) = chunk.error {
        return Err(ProviderErrorKind::Upstream(err.message));
    }

    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.and_then(|d| d.content))
        .collect();

    Ok(if text.is_empty() {
        Frame::Skip
    } else {
        Frame::Chunk(text)
    })
}

/* ===========================================================================
HTTP payloads & options
======================================================================== */

/// Request body for `/v1/chat/completions`.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl<'a> ChatCompletionRequest<'a> {
    fn from_cfg(cfg: &'a LlmModelConfig, messages: &'a [ChatMessage], stream: bool) -> Self {
        Self {
            model: &cfg.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            stream,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
        }
    }
}

/// Minimal response for `/v1/chat/completions`.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessageOut>,
    #[serde(default)]
    delta: Option<ChatMessageOut>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    #[serde(default)]
    content: Option<String>,
}

/// One streamed `chat.completion.chunk`.
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<UpstreamError>,
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config::config_openai;

    #[test]
    fn sse_lines() {
        let line = r#"data: {"id":"c1","choices":[{"index":0,"delta":{"content":"Hel"}}]}"#;
        assert_eq!(decode_sse_line(line).unwrap(), Frame::Chunk("Hel".into()));

        let role_only = r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(decode_sse_line(role_only).unwrap(), Frame::Skip);

        assert_eq!(decode_sse_line("data: [DONE]").unwrap(), Frame::Done);
        assert_eq!(decode_sse_line(": ping").unwrap(), Frame::Skip);
        assert!(matches!(
            decode_sse_line(r#"data: {"error":{"message":"rate limited"}}"#),
            Err(ProviderErrorKind::Upstream(m)) if m == "rate limited"
        ));
        assert!(matches!(
            decode_sse_line("data: {broken"),
            Err(ProviderErrorKind::Decode(_))
        ));
    }

    #[test]
    fn missing_key_is_misconfiguration() {
        let mut cfg = config_openai(120, None);
        cfg.api_key = None;
        let err = OpenAiService::new(cfg).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
