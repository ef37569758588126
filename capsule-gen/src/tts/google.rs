//! Google Cloud Text-to-Speech backend.
//!
//! Direct HTTP implementation of the `text:synthesize` REST endpoint, with
//! API-key authentication.

use super::{TtsBackend, TtsError, TtsOptions};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TTS_API_URL: &str = "https://texttospeech.googleapis.com/v1";

/// Environment variable consulted when no key is configured.
pub const API_KEY_ENV: &str = "GOOGLE_TTS_API_KEY";

pub struct GoogleTtsBackend {
    api_key: String,
    base_url: String,
    client: Client,
}

impl GoogleTtsBackend {
    pub fn new(api_key: String, base_url: Option<&str>) -> Result<Self, TtsError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| TtsError::Network(e.to_string()))?;

        Ok(Self {
            api_key,
            base_url: base_url
                .unwrap_or(TTS_API_URL)
                .trim_end_matches('/')
                .to_string(),
            client,
        })
    }

    /// Build from a configured key, falling back to `GOOGLE_TTS_API_KEY`.
    pub fn from_settings(api_key: Option<&str>, base_url: Option<&str>) -> Result<Self, TtsError> {
        let key = api_key
            .filter(|k| !k.trim().is_empty())
            .map(str::to_string)
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()))
            .ok_or(TtsError::MissingApiKey {
                env_var: API_KEY_ENV,
            })?;
        Self::new(key, base_url)
    }

    /// Voices available for a language, e.g. `fr-FR`.
    pub async fn list_voices(&self, language_code: &str) -> Result<Vec<VoiceInfo>, TtsError> {
        let response = self
            .client
            .get(format!("{}/voices", self.base_url))
            .query(&[("key", self.api_key.as_str()), ("languageCode", language_code)])
            .send()
            .await
            .map_err(|e| TtsError::Network(e.to_string()))?;

        let body: VoicesResponse = parse_response(response).await?;
        Ok(body.voices)
    }
}

// Text-to-Speech API request/response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    ssml: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
    ssml_gender: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
    pitch: f32,
    volume_gain_db: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<VoiceInfo>,
}

/// One voice offered by the service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceInfo {
    pub name: String,
    #[serde(default)]
    pub ssml_gender: String,
    #[serde(default)]
    pub language_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

fn build_request<'a>(ssml: &'a str, options: &'a TtsOptions) -> SynthesizeRequest<'a> {
    SynthesizeRequest {
        input: SynthesisInput { ssml },
        voice: VoiceSelection {
            language_code: &options.language_code,
            name: &options.voice_name,
            ssml_gender: options.gender.as_str(),
        },
        audio_config: AudioConfig {
            audio_encoding: "MP3",
            speaking_rate: options.speaking_rate,
            pitch: options.pitch,
            volume_gain_db: options.volume_gain_db,
        },
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, TtsError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| TtsError::Network(e.to_string()))?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(TtsError::Http {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| TtsError::InvalidResponse(e.to_string()))
}

fn decode_audio(response: &SynthesizeResponse) -> Result<Vec<u8>, TtsError> {
    if response.audio_content.is_empty() {
        return Err(TtsError::InvalidResponse("empty audioContent".to_string()));
    }
    base64::engine::general_purpose::STANDARD
        .decode(&response.audio_content)
        .map_err(|e| TtsError::InvalidResponse(format!("audioContent is not base64: {}", e)))
}

#[async_trait]
impl TtsBackend for GoogleTtsBackend {
    async fn synthesize(&self, ssml: &str, options: &TtsOptions) -> Result<Vec<u8>, TtsError> {
        let request = build_request(ssml, options);
        log::debug!(
            "Synthesizing {} chars with {}",
            ssml.chars().count(),
            options.voice_name
        );

        let response = self
            .client
            .post(format!("{}/text:synthesize", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| TtsError::Network(e.to_string()))?;

        let body: SynthesizeResponse = parse_response(response).await?;
        decode_audio(&body)
    }

    fn name(&self) -> &str {
        "google-tts"
    }
}
