//! Push-based stream of generated text chunks.
//!
//! A provider opens the upstream HTTP response, then hands a producer future
//! to [`TokenStream::spawn`]. The producer runs on its own task and pushes
//! every decoded chunk into an unbounded channel; the consumer polls the
//! [`TokenStream`] like any other `futures::Stream`.
//!
//! Contract:
//! - Items arrive in exactly the order the backend delivered them.
//! - The stream yields `None` once the backend signalled completion.
//! - An `Err` item is terminal: the producer stops right after sending it.
//! - [`TokenStream::cancel`] (or dropping the stream) aborts the producer,
//!   which drops the upstream response and closes the backend connection.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

use crate::error_handler::AiLlmError;

/// Item type carried by a [`TokenStream`].
pub type TokenResult = Result<String, AiLlmError>;

/// Sending half handed to producers.
pub type TokenSender = mpsc::UnboundedSender<TokenResult>;

/// Cancellable stream of generated text chunks.
pub struct TokenStream {
    rx: mpsc::UnboundedReceiver<TokenResult>,
    producer: Option<JoinHandle<()>>,
}

impl TokenStream {
    /// Spawns `produce` on the runtime and returns the consuming half.
    ///
    /// The producer should return as soon as `send` fails, which means the
    /// consumer is gone.
    pub fn spawn<F, Fut>(produce: F) -> Self
    where
        F: FnOnce(TokenSender) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let producer = tokio::spawn(produce(tx));
        Self {
            rx,
            producer: Some(producer),
        }
    }

    /// Stops the producer and releases the upstream response.
    ///
    /// Idempotent. Chunks already buffered are discarded.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.producer.take() {
            if !handle.is_finished() {
                debug!("cancelling token stream producer");
            }
            handle.abort();
        }
        self.rx.close();
    }

    /// `true` once [`TokenStream::cancel`] has run.
    pub fn is_cancelled(&self) -> bool {
        self.producer.is_none()
    }
}

impl Stream for TokenStream {
    type Item = TokenResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.producer.is_none() {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for TokenStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for TokenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStream")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
