//! LLM client used by the capsule generator.
//!
//! Exposes a provider-agnostic request/response API with one real backend
//! (Google Gemini, `generateContent` REST endpoint) and a mock for tests.

pub mod config;
pub mod error;
pub mod provider;
pub mod providers;

pub use config::ProviderSettings;
pub use error::{LlmError, Result};
pub use provider::{LlmProvider, LlmRequest, LlmResponse, TokenUsage};
pub use providers::{GeminiProvider, MockProvider, ProviderKind, get_provider};
