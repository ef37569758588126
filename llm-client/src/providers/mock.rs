//! Mock LLM provider for testing
//!
//! Replays scripted responses in order and can simulate transient failures
//! before the first success.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{LlmError, Result};
use crate::provider::{LlmProvider, LlmRequest, LlmResponse};

/// A mock provider for testing callers of [`LlmProvider`]
pub struct MockProvider {
    /// Number of leading calls that fail
    fail_count: usize,
    /// Current call count
    call_count: AtomicUsize,
    /// Error to return on failure
    fail_with: Option<LlmError>,
    /// Responses handed out in order; the last one repeats
    responses: Mutex<VecDeque<String>>,
    /// Prompts received, in call order
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    /// Create a provider that always succeeds with the same content
    pub fn always_succeeds(response: &str) -> Self {
        Self::with_responses(vec![response.to_string()])
    }

    /// Create a provider that replays `responses` in order
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            fail_count: 0,
            call_count: AtomicUsize::new(0),
            fail_with: None,
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that fails `n` times with the given error, then succeeds
    pub fn fails_then_succeeds(n: usize, error: LlmError, response: &str) -> Self {
        Self {
            fail_count: n,
            fail_with: Some(error),
            ..Self::always_succeeds(response)
        }
    }

    /// Create a provider that always fails with the given error
    pub fn always_fails(error: LlmError) -> Self {
        Self {
            fail_count: usize::MAX,
            fail_with: Some(error),
            ..Self::with_responses(Vec::new())
        }
    }

    /// Get the number of times complete() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_response(&self) -> String {
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap_or_default()
        } else {
            responses.front().cloned().unwrap_or_default()
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let call_num = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt);

        if call_num < self.fail_count {
            if let Some(err) = &self.fail_with {
                return Err(clone_error(err));
            }
        }

        Ok(LlmResponse {
            content: self.next_response(),
            model: "mock-model".to_string(),
            usage: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Clone an LlmError (needed because LlmError doesn't implement Clone)
fn clone_error(err: &LlmError) -> LlmError {
    match err {
        LlmError::MissingApiKey { provider, env_var } => LlmError::MissingApiKey {
            provider: provider.clone(),
            env_var: env_var.clone(),
        },
        LlmError::RateLimited { retry_after } => LlmError::RateLimited {
            retry_after: *retry_after,
        },
        LlmError::ServerOverloaded { status, message } => LlmError::ServerOverloaded {
            status: *status,
            message: message.clone(),
        },
        LlmError::ApiError {
            message,
            status_code,
        } => LlmError::ApiError {
            message: message.clone(),
            status_code: *status_code,
        },
        LlmError::EmptyResponse(s) => LlmError::EmptyResponse(s.clone()),
        LlmError::ConfigError(s) => LlmError::ConfigError(s.clone()),
    }
}
