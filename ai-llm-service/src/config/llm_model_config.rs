use crate::config::llm_provider::LlmProvider;

/// Configuration for one chat-completion backend.
///
/// # Fields
///
/// - `provider`: Which backend this config targets.
/// - `model`: The model identifier (e.g., `"gpt-4o"`, `"llama3.2"`).
/// - `endpoint`: Base URL of the backend (no API path suffix).
/// - `api_key`: API key for remotely-hosted providers.
/// - `max_tokens`: Maximum number of tokens to generate (if supported).
/// - `temperature`: Controls randomness (0.0 = deterministic).
/// - `top_p`: Nucleus sampling cutoff.
/// - `timeout_secs`: Upper wall-clock bound for one provider call.
///
/// # Examples
///
/// ```
/// use ai_llm_service::config::llm_model_config::LlmModelConfig;
/// use ai_llm_service::config::llm_provider::LlmProvider;
///
/// let cfg = LlmModelConfig {
///     provider: LlmProvider::OpenAI,
///     model: "gpt-4o".to_string(),
///     endpoint: "https://api.openai.com".to_string(),
///     api_key: Some("sk-...".to_string()),
///     max_tokens: Some(2048),
///     temperature: Some(0.7),
///     top_p: None,
///     timeout_secs: Some(120),
/// };
/// assert!(cfg.api_key_present());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    /// The backend this config targets.
    pub provider: LlmProvider,

    /// Model identifier string.
    pub model: String,

    /// Base URL of the backend.
    pub endpoint: String,

    /// Optional API key (required by OpenAI and Anthropic).
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Optional request timeout (in seconds).
    pub timeout_secs: Option<u64>,
}

impl LlmModelConfig {
    /// `true` when an API key is set and not blank.
    pub fn api_key_present(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }

    /// Endpoint without trailing slashes, ready for path joining.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim().trim_end_matches('/')
    }
}
