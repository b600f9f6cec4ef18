//! One streaming chat exchange, end to end.
//!
//! The relay runs on its own task and is the single writer of the response
//! body. Frames produced before the provider stream opens are held back:
//! if resolution, retrieval-augmented prompting, or opening the upstream
//! fails, nothing has reached the client yet and the handler answers with a
//! plain JSON 500 instead. Once the held frames are released (the commitment
//! point) every outcome is reported in-band.
//!
//! A dropped response body (client gone) closes the frame channel; the relay
//! notices on its next select, cancels the provider stream and stops.

pub mod events;
pub mod session;

use std::{sync::Arc, time::Duration};

use ai_llm_service::{AiLlmError, TokenStream};
use bytes::Bytes;
use futures::StreamExt;
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, sleep_until, timeout_at},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    chat::normalize::NormalizedConversation,
    core::app_state::AppState,
    error_handler::AppError,
    relay::{
        events::StreamEvent,
        session::{SessionState, StreamSession},
    },
};

/// Body half handed to the HTTP layer at the commitment point.
pub type FrameReceiver = mpsc::UnboundedReceiver<Bytes>;

/// Resolves exactly once: the frame channel on commit, or the error to
/// answer with when the exchange failed before anything was written.
pub type CommitSender = oneshot::Sender<Result<FrameReceiver, AppError>>;

/// Drives one exchange to a terminal state and returns its session.
pub async fn run_relay(
    state: Arc<AppState>,
    conversation: NormalizedConversation,
    commit: CommitSender,
) -> StreamSession {
    let mut session = StreamSession::new(Uuid::new_v4().to_string());
    let message_id = format!("msg-{}", Uuid::new_v4());

    info!(
        target: "api::relay",
        session_id = %session.session_id,
        message_id = %message_id,
        provider = %state.provider_name,
        turns = conversation.history.len() + 1,
        "stream session started"
    );

    let held = vec![
        StreamEvent::TextStart {
            id: message_id.clone(),
        }
        .to_frame(),
    ];

    let mut commit = commit;
    let opened = tokio::select! {
        opened = open_stream(&state, conversation) => opened,
        _ = commit.closed() => {
            session.transition(SessionState::Aborted);
            info!(
                target: "api::relay",
                session_id = %session.session_id,
                "client disconnected before the stream opened"
            );
            return session;
        }
    };

    let (mut stream, deadline) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            session.transition(SessionState::Failed);
            warn!(
                target: "api::relay",
                session_id = %session.session_id,
                error = %e,
                "provider failed before the stream was committed"
            );
            let err = match e {
                AiLlmError::Timeout(_) => AppError::Internal("Request timed out".into()),
                other => AppError::from(other),
            };
            let _ = commit.send(Err(err));
            return session;
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    for frame in held {
        let _ = tx.send(frame);
    }
    if commit.send(Ok(rx)).is_err() {
        stream.cancel();
        session.transition(SessionState::Aborted);
        return session;
    }
    session.transition(SessionState::Streaming);

    pump_events(
        &mut session,
        &mut stream,
        &tx,
        &message_id,
        (deadline, state.llm_timeout),
    )
    .await;

    info!(
        target: "api::relay",
        session_id = %session.session_id,
        message_id = %message_id,
        state = ?session.state(),
        emitted_chunks = session.emitted_chunks,
        emitted_chars = session.emitted_chars,
        "stream session ended"
    );
    session
}

/// Retrieval and prompt assembly, then provider resolution and stream opening.
///
/// The provider deadline starts once retrieval is done; it is returned so
/// the rest of the stream is bounded by the same budget.
async fn open_stream(
    state: &AppState,
    conversation: NormalizedConversation,
) -> Result<(TokenStream, Instant), AiLlmError> {
    let context = state
        .retriever
        .get_context(&conversation.query.content, None)
        .await;
    let messages = conversation.into_messages(&context);

    debug!(
        target: "api::relay",
        with_context = !context.is_empty(),
        turns = messages.len(),
        "prompt assembled"
    );

    let deadline = Instant::now() + state.llm_timeout;
    let open = async {
        let handle = state.gateway.resolve(&state.provider_name).await?;
        handle.stream_complete(&messages).await
    };
    let stream = timeout_at(deadline, open)
        .await
        .map_err(|_| AiLlmError::Timeout(state.llm_timeout))??;
    Ok((stream, deadline))
}

/// Sends `text-end` and `finish`; `Completed` only if the client got both.
fn finish_session(session: &mut StreamSession, tx: &mpsc::UnboundedSender<Bytes>, message_id: &str) {
    let end = StreamEvent::TextEnd {
        id: message_id.to_string(),
    };
    let delivered = tx.send(end.to_frame()).is_ok()
        && tx.send(StreamEvent::finish_stop().to_frame()).is_ok();

    if delivered {
        session.transition(SessionState::Completed);
    } else {
        session.transition(SessionState::Aborted);
        info!(
            target: "api::relay",
            session_id = %session.session_id,
            "client disconnected before the final events"
        );
    }
}

/// Forwards provider chunks as events until a terminal state.
async fn pump_events(
    session: &mut StreamSession,
    stream: &mut TokenStream,
    tx: &mpsc::UnboundedSender<Bytes>,
    message_id: &str,
    (deadline, limit): (Instant, Duration),
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => None,
            _ = sleep_until(deadline) => Some(Err(AiLlmError::Timeout(limit))),
            item = stream.next() => Some(item.map_or(Ok(None), |r| r.map(Some))),
        };

        let outcome = match next {
            // Client went away.
            None => {
                stream.cancel();
                session.transition(SessionState::Aborted);
                info!(
                    target: "api::relay",
                    session_id = %session.session_id,
                    emitted_chunks = session.emitted_chunks,
                    "client disconnected; provider stream cancelled"
                );
                return;
            }
            Some(outcome) => outcome,
        };

        match outcome {
            Ok(Some(chunk)) => {
                if chunk.is_empty() {
                    continue;
                }
                session.record_chunk(&chunk);
                let frame = StreamEvent::TextDelta {
                    id: message_id.to_string(),
                    delta: chunk,
                }
                .to_frame();
                if tx.send(frame).is_err() {
                    stream.cancel();
                    session.transition(SessionState::Aborted);
                    return;
                }
            }
            Ok(None) => {
                finish_session(session, tx, message_id);
                return;
            }
            Err(e) => {
                stream.cancel();
                let error_text = match e {
                    AiLlmError::Timeout(_) => "Request timed out".to_string(),
                    other => other.to_string(),
                };
                warn!(
                    target: "api::relay",
                    session_id = %session.session_id,
                    emitted_chunks = session.emitted_chunks,
                    error = %error_text,
                    "provider stream failed after commit"
                );
                let _ = tx.send(StreamEvent::Error { error_text }.to_frame());
                session.transition(SessionState::Failed);
                return;
            }
        }
    }
}
