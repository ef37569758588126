//! In-memory speech backend for tests.

use super::{TtsBackend, TtsError, TtsOptions};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Echoes the SSML back as "audio", or fails with a fixed HTTP status.
#[derive(Debug, Default)]
pub struct MockTtsBackend {
    fail_status: Option<u16>,
    calls: AtomicUsize,
}

impl MockTtsBackend {
    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TtsBackend for MockTtsBackend {
    async fn synthesize(&self, ssml: &str, _options: &TtsOptions) -> Result<Vec<u8>, TtsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fail_status {
            Some(status) => Err(TtsError::Http {
                status,
                message: "mock failure".to_string(),
            }),
            None => Ok(ssml.as_bytes().to_vec()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
