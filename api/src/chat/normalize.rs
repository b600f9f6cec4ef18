//! Reduces inbound messages of mixed shape to flat `{role, content}` turns.
//!
//! A message carries its text either as `content` (a plain string or a list
//! of typed fragments) or as `parts` (a list of typed fragments). `content`
//! wins when both are present. Only fragments with `type == "text"`
//! contribute; their text is concatenated in order, with no separator.

use ai_llm_service::{ChatMessage, ChatRole};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Text payload of a message: a flat string or an ordered list of fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One typed fragment (`{ "type": "text", "text": "..." }`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            text: Some(text.into()),
        }
    }
}

/// A message as received from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub role: ChatRole,
    #[serde(default, deserialize_with = "lenient_content")]
    pub content: Option<MessageContent>,
    #[serde(default, deserialize_with = "lenient_parts")]
    pub parts: Option<Vec<ContentPart>>,
}

impl InboundMessage {
    pub fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(content.into())),
            parts: None,
        }
    }
}

/// Conversation split into prior turns and the turn being answered.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedConversation {
    pub history: Vec<ChatMessage>,
    pub query: ChatMessage,
}

impl NormalizedConversation {
    /// Final provider input: the context block as one leading system turn
    /// (only when non-empty), then history, then the query.
    pub fn into_messages(self, context: &str) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.history.len() + 2);
        if !context.is_empty() {
            out.push(ChatMessage::system(context));
        }
        out.extend(self.history);
        out.push(self.query);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("Messages array is required")]
    EmptyConversation,

    #[error("Message at index {index} has no text content")]
    InvalidMessageContent { index: usize },
}

/// Flat text of `content`, or `None` when nothing textual remains.
///
/// Whitespace-only text counts as nothing.
pub fn extract_text(content: &MessageContent) -> Option<String> {
    let text = match content {
        MessageContent::Text(s) => s.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter(|p| p.kind == "text")
            .filter_map(|p| p.text.as_deref())
            .collect(),
    };
    (!text.trim().is_empty()).then_some(text)
}

/// Normalizes the message at `index`.
pub fn normalize_message(index: usize, msg: &InboundMessage) -> Result<ChatMessage, NormalizeError> {
    let text = match (&msg.content, &msg.parts) {
        (Some(content), _) => extract_text(content),
        (None, Some(parts)) => extract_text(&MessageContent::Parts(parts.clone())),
        (None, None) => None,
    };
    text.map(|t| ChatMessage::new(msg.role, t))
        .ok_or(NormalizeError::InvalidMessageContent { index })
}

/// Maps every message but the last into history; the last becomes the query.
///
/// Fails on the first message without usable text; nothing is dropped silently.
pub fn normalize_conversation(
    messages: &[InboundMessage],
) -> Result<NormalizedConversation, NormalizeError> {
    let mut turns = messages
        .iter()
        .enumerate()
        .map(|(i, m)| normalize_message(i, m))
        .collect::<Result<Vec<_>, _>>()?;

    let query = turns.pop().ok_or(NormalizeError::EmptyConversation)?;
    Ok(NormalizedConversation {
        history: turns,
        query,
    })
}

/// Any shape that is neither a string nor a fragment list becomes `None`,
/// which surfaces as `InvalidMessageContent` with the message index.
fn lenient_content<'de, D>(de: D) -> Result<Option<MessageContent>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(de)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
}

fn lenient_parts<'de, D>(de: D) -> Result<Option<Vec<ContentPart>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(de)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
}
