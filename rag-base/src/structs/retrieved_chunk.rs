use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata keys that may carry the source document, in priority order.
const SOURCE_KEYS: [&str; 4] = ["source", "sourceId", "filename", "file"];

/// Metadata keys that may carry the page number, in priority order.
const PAGE_KEYS: [&str; 3] = ["page", "pageNumber", "page_number"];

/// One chunk returned by the vector index, nearest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk text as stored at ingestion.
    pub text: String,
    /// Document the chunk came from, `"unknown"` when the metadata is silent.
    pub source_id: String,
    /// Page of the source document, if recorded.
    pub page_number: Option<u32>,
    /// Distance to the query vector (smaller is closer).
    pub distance: Option<f32>,
}

impl RetrievedChunk {
    /// Builds a chunk from a Chroma `(document, metadata, distance)` triple.
    pub fn from_parts(text: String, metadata: Option<&Map<String, Value>>, distance: Option<f32>) -> Self {
        let source_id = metadata
            .and_then(|m| {
                SOURCE_KEYS
                    .iter()
                    .filter_map(|k| m.get(*k))
                    .find_map(|v| match v {
                        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
            })
            .unwrap_or_else(|| "unknown".to_string());

        let page_number = metadata.and_then(|m| {
            PAGE_KEYS
                .iter()
                .filter_map(|k| m.get(*k))
                .find_map(page_from_value)
        });

        Self {
            text,
            source_id,
            page_number,
            distance,
        }
    }
}

fn page_from_value(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|p| u32::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
