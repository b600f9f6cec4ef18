use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::error_handler::{AiLlmError, ConfigError};

/// Represents the provider (backend) used for chat completions.
///
/// The set is closed: a provider identifier coming from configuration or a
/// request must parse into one of these variants, otherwise resolution fails
/// with [`ConfigError::UnknownProvider`].
///
/// # Examples
///
/// ```
/// use ai_llm_service::config::llm_provider::LlmProvider;
///
/// let p: LlmProvider = "Ollama".parse().unwrap();
/// assert_eq!(p, LlmProvider::Ollama);
/// assert!("unknown".parse::<LlmProvider>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI Chat Completions API.
    OpenAI,
}

impl LlmProvider {
    /// Every recognized provider, in the order they are reported to users.
    pub const ALL: [LlmProvider; 3] = [
        LlmProvider::Ollama,
        LlmProvider::Anthropic,
        LlmProvider::OpenAI,
    ];

    /// Stable lowercase identifier (`ollama`, `anthropic`, `openai`).
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "ollama",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::OpenAI => "openai",
        }
    }

    /// Comma-separated list of valid identifiers, used in error payloads.
    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = AiLlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| {
                ConfigError::UnknownProvider {
                    name: s.to_string(),
                    valid: Self::valid_names(),
                }
                .into()
            })
    }
}
