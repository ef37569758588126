//! LLM provider implementations

mod gemini;
pub mod mock;

pub use gemini::GeminiProvider;
pub use mock::MockProvider;

use crate::config::ProviderSettings;
use crate::error::{LlmError, Result};
use crate::provider::LlmProvider;

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
}

impl ProviderKind {
    /// Parse provider kind from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" | "google-gemini" => Ok(Self::Gemini),
            _ => Err(LlmError::ConfigError(format!("Unknown provider: {}", s))),
        }
    }

    /// Get the environment variable name for this provider's API key
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Gemini => "GOOGLE_API_KEY",
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
        }
    }
}

/// Create a provider instance from the configured settings
pub fn get_provider(settings: &ProviderSettings) -> Result<Box<dyn LlmProvider>> {
    let kind = ProviderKind::from_str(&settings.provider)?;
    let api_key = get_api_key(settings, kind)?;

    match kind {
        ProviderKind::Gemini => Ok(Box::new(GeminiProvider::new(settings, api_key)?)),
    }
}

/// Get API key from settings or environment variable
fn get_api_key(settings: &ProviderSettings, kind: ProviderKind) -> Result<String> {
    // Check settings first
    if let Some(key) = settings.api_key.clone().filter(|k| !k.trim().is_empty()) {
        return Ok(key);
    }

    // Fall back to environment variable
    std::env::var(kind.env_var()).map_err(|_| LlmError::MissingApiKey {
        provider: kind.display_name().to_string(),
        env_var: kind.env_var().to_string(),
    })
}
