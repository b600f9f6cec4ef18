//! Line framing shared by the streaming providers.
//!
//! Ollama streams NDJSON, OpenAI and Anthropic stream SSE. Both are
//! line-oriented, so one buffer turns arbitrary byte chunks into complete
//! lines and each provider only supplies a per-line decoder.

use futures::StreamExt;
use tracing::{debug, warn};

use crate::{
    config::llm_provider::LlmProvider,
    error_handler::{AiLlmError, ProviderError, ProviderErrorKind},
    token_stream::TokenSender,
};

/// Accumulates raw bytes and yields complete `\n`-terminated lines.
///
/// Bytes are kept undecoded until a full line is available, so a UTF-8
/// sequence split across network chunks is never mangled.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete line without its terminator (`\r\n` or `\n`).
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left after the upstream closed (a final unterminated line).
    pub fn take_remaining(&mut self) -> Option<String> {
        if self.pending.iter().all(|b| b.is_ascii_whitespace()) {
            self.pending.clear();
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end().to_string())
    }
}

/// Outcome of decoding one upstream line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    /// Generated text to forward.
    Chunk(String),
    /// Keep-alive, metadata, or an event the relay does not care about.
    Skip,
    /// Last piece of text; the backend signalled completion with it.
    Final(String),
    /// The backend signalled completion.
    Done,
}

/// Payload of an SSE `data:` line, `None` for every other SSE line.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Reads `resp` to the end, decoding each line and pushing chunks into `tx`.
///
/// Stops early when the consumer is gone. Sends exactly one `Err` on
/// transport failure, decode failure, or when the body ends before `decode`
/// reported [`Frame::Done`].
pub(crate) async fn pump<D>(
    provider: LlmProvider,
    resp: reqwest::Response,
    tx: TokenSender,
    mut decode: D,
) where
    D: FnMut(&str) -> Result<Frame, ProviderErrorKind> + Send,
{
    let mut body = resp.bytes_stream();
    let mut lines = LineBuffer::new();
    let mut chunks = 0usize;

    loop {
        let next = body.next().await;
        let eof = next.is_none();
        match next {
            Some(Ok(bytes)) => lines.push(&bytes),
            Some(Err(e)) => {
                warn!(%provider, error = %e, "upstream stream transport error");
                let _ = tx.send(Err(AiLlmError::HttpTransport(e)));
                return;
            }
            None => {}
        }

        let mut batch = Vec::new();
        while let Some(line) = lines.next_line() {
            batch.push(line);
        }
        if eof {
            batch.extend(lines.take_remaining());
        }

        for line in batch {
            if line.trim().is_empty() {
                continue;
            }
            match decode(&line) {
                Ok(Frame::Chunk(text)) => {
                    chunks += 1;
                    if tx.send(Ok(text)).is_err() {
                        debug!(%provider, chunks, "token consumer dropped; stopping producer");
                        return;
                    }
                }
                Ok(Frame::Final(text)) => {
                    chunks += 1;
                    let _ = tx.send(Ok(text));
                    debug!(%provider, chunks, "upstream signalled completion");
                    return;
                }
                Ok(Frame::Skip) => {}
                Ok(Frame::Done) => {
                    debug!(%provider, chunks, "upstream signalled completion");
                    return;
                }
                Err(kind) => {
                    warn!(%provider, error = %kind, "failed to decode upstream stream line");
                    let _ = tx.send(Err(ProviderError::new(provider, kind).into()));
                    return;
                }
            }
        }

        if eof {
            warn!(%provider, chunks, "upstream closed without a completion marker");
            let _ = tx.send(Err(
                ProviderError::new(provider, ProviderErrorKind::Truncated).into()
            ));
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lines_across_chunks() {
        let mut buf = LineBuffer::new();
        buf.push(b"{\"a\":1}\n{\"b\"");
        assert_eq!(buf.next_line().as_deref(), Some("{\"a\":1}"));
        assert_eq!(buf.next_line(), None);
        buf.push(b":2}\r\n");
        assert_eq!(buf.next_line().as_deref(), Some("{\"b\":2}"));
        assert_eq!(buf.take_remaining(), None);
    }

    #[test]
    fn keeps_split_utf8_intact() {
        let text = "héllo\n".as_bytes();
        let (a, b) = text.split_at(2);
        let mut buf = LineBuffer::new();
        buf.push(a);
        assert_eq!(buf.next_line(), None);
        buf.push(b);
        assert_eq!(buf.next_line().as_deref(), Some("héllo"));
    }

    #[test]
    fn remaining_unterminated_line() {
        let mut buf = LineBuffer::new();
        buf.push(b"data: [DONE]");
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.take_remaining().as_deref(), Some("data: [DONE]"));
    }

    #[test]
    fn sse_data_prefix() {
        assert_eq!(sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(sse_data("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data("event: ping"), None);
        assert_eq!(sse_data(": keep-alive"), None);
    }
}
