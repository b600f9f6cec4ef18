//! Anthropic Messages API service.
//!
//! - POST {endpoint}/v1/messages: message completion, plain or SSE stream
//!
//! System turns are hoisted into the top-level `system` field (the API does
//! not accept them inside `messages`). `max_tokens` is mandatory for this
//! API, so a default is applied when the config leaves it unset.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    chat::{ChatMessage, ChatRole},
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

/// API version pinned in every request.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Used when `LLM_MAX_TOKENS` is not configured.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug)]
pub struct AnthropicService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_messages: String,
}

impl AnthropicService {
    /// # Errors
    /// - [`ConfigError::ProviderMisconfigured`] if the provider is not
    ///   Anthropic, the API key is missing, or the endpoint is invalid
    /// - [`AiLlmError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        if cfg.provider != LlmProvider::Anthropic {
            return Err(misconfigured(format!("config targets {}", cfg.provider)));
        }
        if !cfg.api_key_present() {
            return Err(misconfigured(
                "ANTHROPIC_API_KEY is required for the anthropic provider",
            ));
        }
        validate_endpoint(&cfg)?;

        let api_key = cfg.api_key.clone().unwrap_or_default();
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "x-api-key",
            header::HeaderValue::from_str(api_key.trim())
                .map_err(|e| misconfigured(format!("invalid API key header: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout_of(&cfg))
            .default_headers(headers)
            .build()?;

        let url_messages = format!("{}/v1/messages", cfg.base_url());

        info!(
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            "AnthropicService initialized"
        );

        Ok(Self {
            client,
            cfg,
            url_messages,
        })
    }

    #[instrument(skip_all, fields(model = %self.cfg.model, turns = messages.len()))]
    pub async fn generate(&self, messages: &[ChatMessage]) -> Result<String, AiLlmError> {
        let started = Instant::now();
        let body = MessagesRequest::from_cfg(&self.cfg, messages, false);

        debug!(model = %self.cfg.model, "POST {}", self.url_messages);
        let resp = self
            .client
            .post(&self.url_messages)
            .json(&body)
            .send()
            .await?;
        let resp = ensure_success(LlmProvider::Anthropic, &self.url_messages, resp).await?;

        let out: MessagesResponse = resp.json().await.map_err(|e| {
            decode_error(
                LlmProvider::Anthropic,
                format!("serde error: {e}; expected `content[].text`"),
            )
        })?;

        let text: String = out
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect();

        if text.is_empty() {
            return Err(
                ProviderError::new(LlmProvider::Anthropic, ProviderErrorKind::EmptyChoices).into(),
            );
        }

        info!(
            model = %self.cfg.model,
            latency_ms = started.elapsed().as_millis(),
            "anthropic message completed"
        );
        Ok(text)
    }

    /// Opens a streaming message; `content_block_delta` events carry text,
    /// `message_stop` ends the stream.
    #[instrument(skip_all, fields(model = %self.cfg.model, turns = messages.len()))]
    pub async fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, AiLlmError> {
        let body = MessagesRequest::from_cfg(&self.cfg, messages, true);

        debug!(model = %self.cfg.model, "POST {} (stream)", self.url_messages);
        let resp = self
            .client
            .post(&self.url_messages)
            .json(&body)
            .send()
            .await?;
        let resp = ensure_success(LlmProvider::Anthropic, &self.url_messages, resp).await?;

        Ok(TokenStream::spawn(move |tx| {
            pump(LlmProvider::Anthropic, resp, tx, decode_event_line)
        }))
    }
}

#[async_trait]
impl ChatProvider for AnthropicService {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AiLlmError> {
        self.generate(messages).await
    }

    async fn stream_complete(&self, messages: &[ChatMessage]) -> Result<TokenStream, AiLlmError> {
        self.generate_stream(messages).await
    }
}

fn misconfigured(reason: impl Into<String>) -> AiLlmError {
    ConfigError::ProviderMisconfigured {
        provider: LlmProvider::Anthropic,
        reason: reason.into(),
    }
    .into()
}

/// Decodes one SSE line of a streaming Messages response.
///
/// `event:` lines are redundant with the `type` field of the data payload.
pub(crate) fn decode_event_line(line: &str) -> Result<Frame, ProviderErrorKind> {
    let Some(data) = sse_data(line) else {
        return Ok(Frame::Skip);
    };

    let event: StreamEvent = serde_json::from_str(data)
        .map_err(|e| ProviderErrorKind::Decode(format!("invalid SSE payload: {e}")))?;

    match event.kind.as_str() {
        "content_block_delta" => Ok(event
            .delta
            .and_then(|d| d.text)
            .filter(|t| !t.is_empty())
            .map(Frame::Chunk)
            .unwrap_or(Frame::Skip)),
        "message_stop" => Ok(Frame::Done),
        "error" => Err(ProviderErrorKind::Upstream(
            event
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unspecified stream error".into()),
        )),
        _ => Ok(Frame::Skip),
    }
}

/* ==========================
HTTP payloads
========================== */

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<TurnOut<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct TurnOut<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> MessagesRequest<'a> {
    fn from_cfg(cfg: &'a LlmModelConfig, messages: &'a [ChatMessage], stream: bool) -> Self {
        let system_parts: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect();
        let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));

        let turns = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| TurnOut {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect();

        Self {
            model: &cfg.model,
            max_tokens: cfg.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages: turns,
            stream,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config::config_anthropic;

    #[test]
    fn event_lines() {
        assert_eq!(
            decode_event_line("event: content_block_delta").unwrap(),
            Frame::Skip
        );
        assert_eq!(
            decode_event_line(
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#
            )
            .unwrap(),
            Frame::Chunk("Hi".into())
        );
        assert_eq!(
            decode_event_line(r#"data: {"type":"message_start","message":{}}"#).unwrap(),
            Frame::Skip
        );
        assert_eq!(
            decode_event_line(r#"data: {"type":"message_stop"}"#).unwrap(),
            Frame::Done
        );
        assert!(matches!(
            decode_event_line(r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#),
            Err(ProviderErrorKind::Upstream(m)) if m == "Overloaded"
        ));
    }

    #[test]
    fn system_turns_are_hoisted() {
        let mut cfg = config_anthropic(120, None);
        cfg.api_key = Some("k".into());
        let msgs = vec![
            ChatMessage::system("context block"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
            ChatMessage::user("question"),
        ];
        let body = serde_json::to_value(MessagesRequest::from_cfg(&cfg, &msgs, true)).unwrap();
        assert_eq!(body["system"], "context block");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn missing_key_is_misconfiguration() {
        let mut cfg = config_anthropic(120, None);
        cfg.api_key = Some("   ".into());
        let err = AnthropicService::new(cfg).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
