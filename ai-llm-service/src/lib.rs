//! Chat-completion provider gateway.
//!
//! - [`provider_gateway::ProviderGateway`] resolves `ollama` / `anthropic` /
//!   `openai` to a cached [`provider::ChatProvider`] backend.
//! - [`token_stream::TokenStream`] carries streamed chunks and supports
//!   cancellation.
//! - [`health_service::HealthService`] probes configured backends.

pub mod chat;
pub mod config;
pub mod error_handler;
pub mod health_service;
pub mod provider;
pub mod provider_gateway;
pub mod services;
pub mod telemetry;
pub mod token_stream;

pub use chat::{ChatMessage, ChatRole};
pub use config::llm_provider::LlmProvider;
pub use error_handler::AiLlmError;
pub use provider::ChatProvider;
pub use provider_gateway::{ProviderGateway, ProviderHandle};
pub use token_stream::TokenStream;
