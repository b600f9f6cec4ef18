//! Outward event protocol: one `data: <json>\n\n` frame per event.

use bytes::Bytes;
use serde::Serialize;

/// Why a successful stream ended.
pub const FINISH_REASON_STOP: &str = "stop";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    Finish {
        #[serde(rename = "finishReason")]
        finish_reason: String,
    },
    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },
}

impl StreamEvent {
    pub fn finish_stop() -> Self {
        StreamEvent::Finish {
            finish_reason: FINISH_REASON_STOP.to_string(),
        }
    }

    /// `data: {...}\n\n`.
    pub fn to_frame(&self) -> Bytes {
        // Every variant is plain strings, serialization cannot fail.
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        Bytes::from(format!("data: {json}\n\n"))
    }
}
