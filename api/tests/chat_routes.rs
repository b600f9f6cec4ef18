use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use ai_llm_service::{
    AiLlmError, ChatMessage, ChatProvider, ChatRole, LlmProvider, ProviderGateway, TokenStream,
    config::default_config::{
        ProviderSettings, config_anthropic, config_ollama_chat, config_ollama_embedding,
        config_openai,
    },
    error_handler::{ProviderError, ProviderErrorKind},
};
use api::{
    chat::normalize::{InboundMessage, normalize_conversation},
    core::app_state::AppState,
    relay::{run_relay, session::SessionState},
    router,
};
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use rag_base::{CONTEXT_PREAMBLE, ContextRetriever, Embedder, RagBaseError, RetrievedChunk, VectorIndex};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tower::ServiceExt;

/* ---------------------------- fakes ---------------------------- */

#[derive(Clone, Copy)]
enum Tail {
    End,
    Fail(&'static str),
    Hang,
    Endless,
}

struct ScriptedProvider {
    chunks: Vec<&'static str>,
    tail: Tail,
    produced: Arc<AtomicUsize>,
    seen: Mutex<Vec<ChatMessage>>,
}

impl ScriptedProvider {
    fn new(chunks: Vec<&'static str>, tail: Tail) -> Arc<Self> {
        Arc::new(Self {
            chunks,
            tail,
            produced: Arc::new(AtomicUsize::new(0)),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AiLlmError> {
        *self.seen.lock().unwrap() = messages.to_vec();
        Ok(self.chunks.concat())
    }

    async fn stream_complete(&self, messages: &[ChatMessage]) -> Result<TokenStream, AiLlmError> {
        *self.seen.lock().unwrap() = messages.to_vec();
        let chunks = self.chunks.clone();
        let tail = self.tail;
        let produced = Arc::clone(&self.produced);

        Ok(TokenStream::spawn(move |tx| async move {
            for c in chunks {
                produced.fetch_add(1, Ordering::SeqCst);
                if tx.send(Ok(c.to_string())).is_err() {
                    return;
                }
            }
            match tail {
                Tail::End => {}
                Tail::Fail(msg) => {
                    let err = ProviderError::new(
                        LlmProvider::Ollama,
                        ProviderErrorKind::Upstream(msg.to_string()),
                    );
                    let _ = tx.send(Err(err.into()));
                }
                Tail::Hang => std::future::pending::<()>().await,
                Tail::Endless => loop {
                    produced.fetch_add(1, Ordering::SeqCst);
                    if tx.send(Ok("tick ".to_string())).is_err() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                },
            }
        }))
    }
}

struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagBaseError> {
        Ok(vec![0.5, 0.5])
    }
}

struct StaticIndex(Vec<RetrievedChunk>);

#[async_trait]
impl VectorIndex for StaticIndex {
    async fn query_nearest(
        &self,
        _vector: &[f32],
        top_n: usize,
    ) -> Result<Vec<RetrievedChunk>, RagBaseError> {
        Ok(self.0.iter().take(top_n).cloned().collect())
    }

    async fn reset_cache(&self) {}
}

struct FailingIndex;

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn query_nearest(
        &self,
        _vector: &[f32],
        _top_n: usize,
    ) -> Result<Vec<RetrievedChunk>, RagBaseError> {
        Err(RagBaseError::InvalidConfig("index down".into()))
    }

    async fn reset_cache(&self) {}
}

/// Answers with no chunks after the given delay.
struct SlowIndex(Duration);

#[async_trait]
impl VectorIndex for SlowIndex {
    async fn query_nearest(
        &self,
        _vector: &[f32],
        _top_n: usize,
    ) -> Result<Vec<RetrievedChunk>, RagBaseError> {
        tokio::time::sleep(self.0).await;
        Ok(Vec::new())
    }

    async fn reset_cache(&self) {}
}

/* ---------------------------- helpers ---------------------------- */

fn settings() -> ProviderSettings {
    let unreachable = "http://127.0.0.1:9".to_string();
    let mut ollama = config_ollama_chat(5, None);
    ollama.endpoint = unreachable.clone();
    let mut embedding = config_ollama_embedding();
    embedding.endpoint = unreachable;
    let mut openai = config_openai(5, None);
    openai.api_key = None;
    let mut anthropic = config_anthropic(5, None);
    anthropic.api_key = None;
    ProviderSettings {
        ollama,
        openai,
        anthropic,
        embedding,
    }
}

async fn state_with_index(
    provider: Arc<ScriptedProvider>,
    provider_name: &str,
    index: Arc<dyn VectorIndex>,
    timeout: Duration,
) -> Arc<AppState> {
    let gateway = Arc::new(ProviderGateway::new(settings()));
    gateway
        .register(LlmProvider::Ollama, "fake-model", provider)
        .await;
    let retriever = ContextRetriever::new(Arc::new(FixedEmbedder), index, 3);
    Arc::new(AppState::new(gateway, provider_name, retriever, timeout).unwrap())
}

async fn state_with(
    provider: Arc<ScriptedProvider>,
    provider_name: &str,
    chunks: Vec<RetrievedChunk>,
    timeout: Duration,
) -> Arc<AppState> {
    state_with_index(provider, provider_name, Arc::new(StaticIndex(chunks)), timeout).await
}

async fn app(provider: Arc<ScriptedProvider>) -> Router {
    router(state_with(provider, "ollama", Vec::new(), Duration::from_secs(5)).await)
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, headers, body)
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn user_says(text: &str) -> String {
    json!({ "messages": [{ "role": "user", "content": text }] }).to_string()
}

fn events(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .split("\n\n")
        .filter(|f| !f.is_empty())
        .map(|f| serde_json::from_str(f.strip_prefix("data: ").unwrap()).unwrap())
        .collect()
}

fn types(events: &[Value]) -> Vec<&str> {
    events.iter().map(|e| e["type"].as_str().unwrap()).collect()
}

/* ---------------------------- streaming ---------------------------- */

#[tokio::test]
async fn stream_emits_start_deltas_end_finish() {
    let provider = ScriptedProvider::new(vec!["Hel", "", "lo"], Tail::End);
    let chunks = ["Pantry A opens at 9.", "Pantry B is closed on Mondays."]
        .into_iter()
        .enumerate()
        .map(|(i, text)| RetrievedChunk {
            text: text.into(),
            source_id: "food-banks.pdf".into(),
            page_number: Some(i as u32 + 1),
            distance: Some(0.1),
        })
        .collect();
    let state = state_with(Arc::clone(&provider), "ollama", chunks, Duration::from_secs(5)).await;
    let (status, headers, body) = send(
        router(state),
        post("/api/chat", user_says("What food banks are open today?")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");

    let ev = events(&body);
    assert_eq!(
        types(&ev),
        ["text-start", "text-delta", "text-delta", "text-end", "finish"]
    );
    let id = ev[0]["id"].as_str().unwrap();
    assert!(id.starts_with("msg-"));
    assert!(ev[1..4].iter().all(|e| e["id"] == id));
    assert_eq!(ev[1]["delta"], "Hel");
    assert_eq!(ev[2]["delta"], "lo");
    assert_eq!(ev[4]["finishReason"], "stop");

    let seen = provider.seen.lock().unwrap().clone();
    assert_eq!(seen[0].role, ChatRole::System);
    assert!(seen[0].content.contains("[2] (food-banks.pdf, page 2)"));
}

#[tokio::test]
async fn provider_error_after_deltas_is_reported_in_band() {
    let provider = ScriptedProvider::new(vec!["partial"], Tail::Fail("overloaded"));
    let (status, _, body) = send(app(provider).await, post("/api/chat", user_says("hi"))).await;

    assert_eq!(status, StatusCode::OK);
    let ev = events(&body);
    assert_eq!(types(&ev), ["text-start", "text-delta", "error"]);
    assert!(ev[2]["errorText"].as_str().unwrap().contains("overloaded"));
}

#[tokio::test]
async fn stalled_provider_times_out_in_band() {
    let provider = ScriptedProvider::new(vec!["a"], Tail::Hang);
    let state = state_with(provider, "ollama", Vec::new(), Duration::from_millis(200)).await;
    let (status, _, body) = send(router(state), post("/api/chat", user_says("hi"))).await;

    assert_eq!(status, StatusCode::OK);
    let ev = events(&body);
    assert_eq!(types(&ev), ["text-start", "text-delta", "error"]);
    assert_eq!(ev[2]["errorText"], "Request timed out");
}

#[tokio::test]
async fn unknown_provider_fails_before_streaming() {
    let provider = ScriptedProvider::new(vec!["never"], Tail::End);
    let state = state_with(provider, "mystery", Vec::new(), Duration::from_secs(5)).await;
    let (status, headers, body) = send(router(state), post("/api/chat", user_says("hi"))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json")
    );
    let v: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["success"], false);
    let msg = v["error"].as_str().unwrap();
    assert!(msg.contains("mystery"));
    assert!(msg.contains("ollama, anthropic, openai"));
}

#[tokio::test]
async fn client_disconnect_aborts_and_cancels_producer() {
    let provider = ScriptedProvider::new(vec![], Tail::Endless);
    let produced = Arc::clone(&provider.produced);
    let state = state_with(provider, "ollama", Vec::new(), Duration::from_secs(5)).await;

    let messages = vec![InboundMessage::text(ChatRole::User, "stream forever")];
    let conversation = normalize_conversation(&messages).unwrap();
    let (commit_tx, commit_rx) = oneshot::channel();
    let relay = tokio::spawn(run_relay(state, conversation, commit_tx));

    let mut frames = commit_rx.await.unwrap().unwrap();
    for _ in 0..3 {
        frames.recv().await.unwrap();
    }
    drop(frames);

    let session = tokio::time::timeout(Duration::from_secs(2), relay)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.state(), SessionState::Aborted);
    assert!(session.emitted_chunks >= 2);

    let seen = produced.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(produced.load(Ordering::SeqCst), seen);
}

#[tokio::test]
async fn index_failure_still_streams_without_context() {
    let provider = ScriptedProvider::new(vec!["No ", "context."], Tail::End);
    let state = state_with_index(
        Arc::clone(&provider),
        "ollama",
        Arc::new(FailingIndex),
        Duration::from_secs(5),
    )
    .await;
    let (status, _, body) = send(router(state), post("/api/chat", user_says("hi"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        types(&events(&body)),
        ["text-start", "text-delta", "text-delta", "text-end", "finish"]
    );
    let seen = provider.seen.lock().unwrap().clone();
    assert_eq!(seen, vec![ChatMessage::user("hi")]);
}

#[tokio::test]
async fn slow_retrieval_does_not_consume_the_provider_budget() {
    let provider = ScriptedProvider::new(vec!["late but fine"], Tail::End);
    let state = state_with_index(
        provider,
        "ollama",
        Arc::new(SlowIndex(Duration::from_millis(300))),
        Duration::from_millis(200),
    )
    .await;
    let (status, _, body) = send(router(state), post("/api/chat", user_says("hi"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        types(&events(&body)),
        ["text-start", "text-delta", "text-end", "finish"]
    );
}

#[tokio::test]
async fn client_leaving_before_commit_aborts() {
    let provider = ScriptedProvider::new(vec!["never sent"], Tail::End);
    let state = state_with_index(
        Arc::clone(&provider),
        "ollama",
        Arc::new(SlowIndex(Duration::from_millis(300))),
        Duration::from_secs(5),
    )
    .await;

    let messages = vec![InboundMessage::text(ChatRole::User, "hello?")];
    let conversation = normalize_conversation(&messages).unwrap();
    let (commit_tx, commit_rx) = oneshot::channel();
    let relay = tokio::spawn(run_relay(state, conversation, commit_tx));
    drop(commit_rx);

    let session = tokio::time::timeout(Duration::from_secs(2), relay)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.state(), SessionState::Aborted);
    assert_eq!(session.emitted_chunks, 0);
    assert!(provider.seen.lock().unwrap().is_empty());
}

/* ---------------------------- validation ---------------------------- */

async fn expect_bad_request(body: &'static str) -> String {
    let provider = ScriptedProvider::new(vec!["x"], Tail::End);
    let (status, _, bytes) = send(app(provider).await, post("/api/chat", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let v: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["success"], false);
    v["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn missing_or_empty_messages_are_rejected() {
    assert_eq!(expect_bad_request("{}").await, "Messages array is required");
    assert_eq!(
        expect_bad_request(r#"{"messages":[]}"#).await,
        "Messages array is required"
    );
}

#[tokio::test]
async fn message_without_text_names_its_index() {
    let err = expect_bad_request(
        r#"{"messages":[{"role":"user","content":"ok"},{"role":"assistant","content":"   "}]}"#,
    )
    .await;
    assert_eq!(err, "Message at index 1 has no text content");
}

#[tokio::test]
async fn unknown_role_and_malformed_json_are_bad_requests() {
    expect_bad_request(r#"{"messages":[{"role":"robot","content":"x"}]}"#).await;
    expect_bad_request("{not json").await;
}

/* ---------------------------- other routes ---------------------------- */

#[tokio::test]
async fn complete_returns_full_answer_and_injects_context() {
    let provider = ScriptedProvider::new(vec!["Hel", "lo"], Tail::End);
    let chunk = RetrievedChunk {
        text: "Setup takes five minutes.".into(),
        source_id: "manual.pdf".into(),
        page_number: Some(2),
        distance: Some(0.2),
    };
    let state = state_with(Arc::clone(&provider), "ollama", vec![chunk], Duration::from_secs(5)).await;

    let body = json!({ "messages": [
        { "role": "user", "content": "hello" },
        { "role": "assistant", "parts": [{ "type": "text", "text": "hi" }] },
        { "role": "user", "content": [{ "type": "text", "text": "how long is setup?" }] }
    ]})
    .to_string();
    let (status, _, bytes) = send(router(state), post("/api/chat/complete", body)).await;

    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["success"], true);
    assert_eq!(v["data"]["response"], "Hello");
    assert_eq!(v["data"]["model"], "fake-model");
    assert_eq!(v["data"]["provider"], "ollama");

    let seen = provider.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0].role, ChatRole::System);
    assert!(seen[0].content.starts_with(CONTEXT_PREAMBLE));
    assert!(seen[0].content.contains("[1] (manual.pdf, page 2)"));
    assert_eq!(seen[3], ChatMessage::user("how long is setup?"));
}

#[tokio::test]
async fn no_context_means_no_system_turn() {
    let provider = ScriptedProvider::new(vec!["ok"], Tail::End);
    let (status, _, _) = send(
        app(Arc::clone(&provider)).await,
        post("/api/chat", user_says("anything")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let seen = provider.seen.lock().unwrap().clone();
    assert_eq!(seen, vec![ChatMessage::user("anything")]);
}

#[tokio::test]
async fn health_reports_every_provider() {
    let provider = ScriptedProvider::new(vec![], Tail::End);
    let req = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let (status, _, bytes) = send(app(provider).await, req).await;

    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["provider"], "ollama");
    let services = v["services"].as_array().unwrap();
    assert_eq!(services.len(), 3);
    assert!(services.iter().all(|s| s["ok"] == false));
    let openai = services.iter().find(|s| s["provider"] == "openai").unwrap();
    assert!(openai["message"].as_str().unwrap().contains("API key"));
}

#[tokio::test]
async fn index_reset_acknowledges() {
    let provider = ScriptedProvider::new(vec![], Tail::End);
    let (status, _, bytes) = send(app(provider).await, post("/api/admin/index/reset", Body::empty())).await;

    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["success"], true);
}
