//! Speech synthesis backend trait and types.

pub mod google;
#[cfg(test)]
pub(crate) mod mock;

pub use google::GoogleTtsBackend;

use crate::retry::{with_retry, RetryPolicy, Retryable};
use crate::text::SynthesisSegment;
use anyhow::{Context, Result};
use async_trait::async_trait;
use indicatif::ProgressBar;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Speech-synthesis errors.
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Speech API key not found. Set {env_var} or add speech.api_key to the config.")]
    MissingApiKey { env_var: &'static str },

    #[error("Speech API error (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid speech API response: {0}")]
    InvalidResponse(String),
}

impl Retryable for TtsError {
    fn is_retryable(&self, policy: &RetryPolicy) -> bool {
        match self {
            TtsError::Http { status, .. } => policy.retries_status(*status),
            TtsError::Network(_) => true,
            _ => false,
        }
    }
}

/// Voice gender requested from the speech service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoiceGender {
    Male,
    Female,
    Neutral,
}

impl VoiceGender {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceGender::Male => "MALE",
            VoiceGender::Female => "FEMALE",
            VoiceGender::Neutral => "NEUTRAL",
        }
    }
}

/// Voice and prosody settings for synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct TtsOptions {
    pub language_code: String,
    pub voice_name: String,
    pub gender: VoiceGender,
    /// Speaking rate (0.25-4.0, default 0.9)
    /// Slightly slower than normal for comprehension
    pub speaking_rate: f32,
    /// Pitch in semitones (-20.0-20.0, default -2.0)
    pub pitch: f32,
    /// Volume gain in dB (-96.0-16.0, default 0.0)
    pub volume_gain_db: f32,
}

impl Default for TtsOptions {
    fn default() -> Self {
        Self {
            language_code: "fr-FR".to_string(),
            voice_name: "fr-FR-Standard-B".to_string(),
            gender: VoiceGender::Male,
            speaking_rate: 0.9,
            pitch: -2.0,
            volume_gain_db: 0.0,
        }
    }
}

impl TtsOptions {
    /// Create new TTS options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the voice; the language code is taken from the voice name prefix.
    pub fn with_voice(mut self, name: impl Into<String>) -> Self {
        self.voice_name = name.into();
        if let Some(lang) = language_of(&self.voice_name) {
            self.language_code = lang;
        }
        self
    }

    pub fn with_gender(mut self, gender: VoiceGender) -> Self {
        self.gender = gender;
        self
    }

    /// Set the speaking rate.
    pub fn with_speaking_rate(mut self, rate: f32) -> Self {
        self.speaking_rate = rate.clamp(0.25, 4.0);
        self
    }

    /// Set the pitch.
    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch.clamp(-20.0, 20.0);
        self
    }

    /// Set the volume gain.
    pub fn with_volume_gain_db(mut self, gain: f32) -> Self {
        self.volume_gain_db = gain.clamp(-96.0, 16.0);
        self
    }
}

/// `fr-FR-Standard-B` → `fr-FR`
fn language_of(voice_name: &str) -> Option<String> {
    let mut parts = voice_name.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(lang), Some(region), Some(_)) if !lang.is_empty() && !region.is_empty() => {
            Some(format!("{}-{}", lang, region))
        }
        _ => None,
    }
}

/// TTS backend trait - all speech services implement this.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Synthesize one SSML document to encoded audio bytes.
    async fn synthesize(&self, ssml: &str, options: &TtsOptions) -> Result<Vec<u8>, TtsError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

static BREAK_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<break[^>]*/>").unwrap());

/// Wrap normalized text in `<speak>`, escaping everything but pause tags.
pub fn to_ssml(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    out.push_str("<speak>");

    let mut last = 0;
    for tag in BREAK_TAG.find_iter(text) {
        out.push_str(&escape_xml(&text[last..tag.start()]));
        out.push_str(tag.as_str());
        last = tag.end();
    }
    out.push_str(&escape_xml(&text[last..]));

    out.push_str("</speak>");
    out
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Synthesize every segment in order, retrying transient failures.
///
/// Fails on the first segment that cannot be synthesized.
pub async fn synthesize_segments(
    backend: &dyn TtsBackend,
    segments: &[SynthesisSegment],
    options: &TtsOptions,
    policy: &RetryPolicy,
    progress: Option<&ProgressBar>,
) -> Result<Vec<Vec<u8>>> {
    let mut parts = Vec::with_capacity(segments.len());

    for segment in segments {
        let ssml = to_ssml(&segment.text);
        let what = format!("{} segment {}", backend.name(), segment.index + 1);
        let audio = with_retry(policy, &what, || backend.synthesize(&ssml, options))
            .await
            .with_context(|| {
                format!(
                    "Synthesis failed for segment {}/{}",
                    segment.index + 1,
                    segments.len()
                )
            })?;
        log::debug!(
            "Segment {}: {} chars -> {} bytes",
            segment.index + 1,
            segment.text.chars().count(),
            audio.len()
        );
        parts.push(audio);

        if let Some(pb) = progress {
            pb.inc(1);
        }
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::mock::MockTtsBackend;
    use super::*;

    #[test]
    fn test_tts_options_default() {
        let opts = TtsOptions::default();
        assert_eq!(opts.language_code, "fr-FR");
        assert_eq!(opts.voice_name, "fr-FR-Standard-B");
        assert_eq!(opts.gender, VoiceGender::Male);
        assert_eq!(opts.speaking_rate, 0.9);
        assert_eq!(opts.pitch, -2.0);
    }

    #[test]
    fn test_tts_options_builder() {
        let opts = TtsOptions::new()
            .with_voice("en-GB-Wavenet-A")
            .with_gender(VoiceGender::Female)
            .with_speaking_rate(1.1)
            .with_pitch(1.0);

        assert_eq!(opts.voice_name, "en-GB-Wavenet-A");
        assert_eq!(opts.language_code, "en-GB");
        assert_eq!(opts.gender, VoiceGender::Female);
        assert_eq!(opts.speaking_rate, 1.1);
        assert_eq!(opts.pitch, 1.0);
    }

    #[test]
    fn test_tts_options_clamping() {
        let opts = TtsOptions::new()
            .with_speaking_rate(10.0) // Should clamp to 4.0
            .with_pitch(-50.0) // Should clamp to -20.0
            .with_volume_gain_db(30.0); // Should clamp to 16.0

        assert_eq!(opts.speaking_rate, 4.0);
        assert_eq!(opts.pitch, -20.0);
        assert_eq!(opts.volume_gain_db, 16.0);
    }

    #[test]
    fn test_unparseable_voice_keeps_language() {
        let opts = TtsOptions::new().with_voice("custom");
        assert_eq!(opts.language_code, "fr-FR");
    }

    #[test]
    fn test_to_ssml_keeps_breaks_escapes_rest() {
        assert_eq!(
            to_ssml("A < B.<break time=\"0.5s\"/> Fin"),
            "<speak>A &lt; B.<break time=\"0.5s\"/> Fin</speak>"
        );
        assert_eq!(to_ssml(""), "<speak></speak>");
    }

    #[test]
    fn test_tts_error_retryable() {
        let policy = RetryPolicy::default();
        assert!(TtsError::Http { status: 503, message: String::new() }.is_retryable(&policy));
        assert!(!TtsError::Http { status: 400, message: String::new() }.is_retryable(&policy));
        assert!(TtsError::Network("reset".into()).is_retryable(&policy));
        assert!(!TtsError::MissingApiKey { env_var: "X" }.is_retryable(&policy));
    }

    #[tokio::test]
    async fn test_synthesize_segments_in_order() {
        let backend = MockTtsBackend::default();
        let segments = vec![
            SynthesisSegment::new(0, "Un.".into()),
            SynthesisSegment::new(1, "Deux.".into()),
        ];
        let parts = synthesize_segments(
            &backend,
            &segments,
            &TtsOptions::default(),
            &RetryPolicy::default(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(parts, vec![b"<speak>Un.</speak>".to_vec(), b"<speak>Deux.</speak>".to_vec()]);
    }

    #[tokio::test]
    async fn test_synthesize_segments_retries_then_fails() {
        let backend = MockTtsBackend::failing(503);
        let policy = RetryPolicy {
            initial_delay_ms: 1,
            max_delay_ms: 1,
            ..Default::default()
        };
        let segments = vec![SynthesisSegment::new(0, "Un.".into())];
        let result =
            synthesize_segments(&backend, &segments, &TtsOptions::default(), &policy, None).await;

        assert!(result.is_err());
        assert_eq!(backend.call_count(), 3);
    }
}
