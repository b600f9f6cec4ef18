use ai_llm_service::LlmProvider;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    chat::normalize::{InboundMessage, NormalizeError},
    error_handler::{AppError, AppResult},
};

/// Request payload for `POST /api/chat` and `POST /api/chat/complete`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Kept raw so that a missing or non-array value maps to the dedicated
    /// "Messages array is required" error rather than a schema error.
    #[serde(default)]
    pub messages: Option<Value>,
}

impl ChatRequest {
    /// Non-empty list of inbound messages.
    ///
    /// # Errors
    /// - [`NormalizeError::EmptyConversation`] when absent, not an array, or empty
    /// - [`AppError::BadRequest`] when an element does not match the message schema
    pub fn into_messages(self) -> AppResult<Vec<InboundMessage>> {
        let items = match self.messages {
            Some(Value::Array(items)) if !items.is_empty() => items,
            _ => return Err(NormalizeError::EmptyConversation.into()),
        };
        items
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                serde_json::from_value(v)
                    .map_err(|e| AppError::BadRequest(format!("Invalid message at index {i}: {e}")))
            })
            .collect()
    }
}

/// Response payload for `POST /api/chat/complete`.
#[derive(Debug, Serialize)]
pub struct ChatCompleteResponse {
    /// Full model answer.
    pub response: String,
    pub model: String,
    pub provider: LlmProvider,
    /// RFC3339 UTC.
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn req(v: Value) -> ChatRequest {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn missing_or_empty_messages_are_required() {
        for body in [json!({}), json!({ "messages": [] }), json!({ "messages": "hi" })] {
            let err = req(body).into_messages().unwrap_err();
            assert_eq!(err.to_string(), "Messages array is required");
        }
    }

    #[test]
    fn unknown_role_is_a_bad_request() {
        let err = req(json!({ "messages": [{ "role": "robot", "content": "x" }] }))
            .into_messages()
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m.contains("index 0")));
    }
}
