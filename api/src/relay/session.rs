//! Bookkeeping for one streaming exchange.

use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Started,
    Streaming,
    Completed,
    Failed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Aborted
        )
    }

    /// Allowed: `Started → Streaming → Completed | Failed`, `Started → Failed`,
    /// and `Aborted` from any non-terminal state.
    fn can_move_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Started, Streaming)
                | (Started, Failed)
                | (Started, Aborted)
                | (Streaming, Completed)
                | (Streaming, Failed)
                | (Streaming, Aborted)
        )
    }
}

/// State plus counters of one exchange; owned by the relay task.
#[derive(Debug, Clone, Serialize)]
pub struct StreamSession {
    pub session_id: String,
    state: SessionState,
    pub emitted_chunks: usize,
    pub emitted_chars: usize,
}

impl StreamSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: SessionState::Started,
            emitted_chunks: 0,
            emitted_chars: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves to `next`; returns `false` (and stays put) for a disallowed move.
    /// Terminal states never change.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_move_to(next) {
            if !self.state.is_terminal() {
                warn!(
                    target: "api::relay",
                    session_id = %self.session_id,
                    from = ?self.state,
                    to = ?next,
                    "ignored invalid session transition"
                );
            }
            return false;
        }
        debug!(
            target: "api::relay",
            session_id = %self.session_id,
            from = ?self.state,
            to = ?next,
            "session transition"
        );
        self.state = next;
        true
    }

    pub fn record_chunk(&mut self, chunk: &str) {
        self.emitted_chunks += 1;
        self.emitted_chars += chunk.chars().count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut s = StreamSession::new("s1");
        assert!(s.transition(SessionState::Streaming));
        assert!(s.transition(SessionState::Completed));
        assert_eq!(s.state(), SessionState::Completed);
    }

    #[test]
    fn terminal_states_are_sticky() {
        for terminal in [
            SessionState::Completed,
            SessionState::Failed,
            SessionState::Aborted,
        ] {
            let mut s = StreamSession::new("s");
            s.transition(SessionState::Streaming);
            s.transition(terminal);
            for next in [
                SessionState::Started,
                SessionState::Streaming,
                SessionState::Completed,
                SessionState::Failed,
                SessionState::Aborted,
            ] {
                assert!(!s.transition(next));
                assert_eq!(s.state(), terminal);
            }
        }
    }

    #[test]
    fn cannot_complete_without_streaming() {
        let mut s = StreamSession::new("s");
        assert!(!s.transition(SessionState::Completed));
        assert!(s.transition(SessionState::Aborted));
    }

    #[test]
    fn counters_track_chars_not_bytes() {
        let mut s = StreamSession::new("s");
        s.record_chunk("héllo");
        s.record_chunk("!");
        assert_eq!(s.emitted_chunks, 2);
        assert_eq!(s.emitted_chars, 6);
    }
}
