//! capsules configuration management.

use crate::audio::DEFAULT_PAUSE_MS;
use crate::retry::RetryPolicy;
use crate::scrape::ScrapeSettings;
use crate::text::DEFAULT_SEGMENT_BUDGET;
use crate::tts::{TtsOptions, VoiceGender};
use anyhow::{Context, Result};
use llm_client::ProviderSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapsuleConfig {
    #[serde(default)]
    pub speech: SpeechSettings,

    #[serde(default)]
    pub llm: ProviderSettings,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub scrape: ScrapeSettings,

    #[serde(default)]
    pub typeset: TypesetSettings,

    #[serde(default)]
    pub audio: AudioSettings,
}

/// Voice, prosody and segmentation for the narration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSettings {
    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_gender")]
    pub gender: VoiceGender,

    /// Speaking rate (0.25-4.0)
    #[serde(default = "default_speaking_rate")]
    pub speaking_rate: f32,

    /// Pitch in semitones (-20.0-20.0)
    #[serde(default = "default_pitch")]
    pub pitch: f32,

    #[serde(default)]
    pub volume_gain_db: f32,

    /// Maximum characters per synthesis request
    #[serde(default = "default_segment_budget")]
    pub segment_budget: usize,

    /// Silence between segments in the final audio
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,

    /// API key (optional, GOOGLE_TTS_API_KEY is used otherwise)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_voice() -> String {
    "fr-FR-Standard-B".to_string()
}

fn default_gender() -> VoiceGender {
    VoiceGender::Male
}

fn default_speaking_rate() -> f32 {
    0.9
}

fn default_pitch() -> f32 {
    -2.0
}

fn default_segment_budget() -> usize {
    DEFAULT_SEGMENT_BUDGET
}

fn default_pause_ms() -> u64 {
    DEFAULT_PAUSE_MS
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            voice: default_voice(),
            gender: default_gender(),
            speaking_rate: default_speaking_rate(),
            pitch: default_pitch(),
            volume_gain_db: 0.0,
            segment_budget: default_segment_budget(),
            pause_ms: default_pause_ms(),
            api_key: None,
            base_url: None,
        }
    }
}

impl SpeechSettings {
    pub fn tts_options(&self) -> TtsOptions {
        TtsOptions::new()
            .with_voice(self.voice.clone())
            .with_gender(self.gender)
            .with_speaking_rate(self.speaking_rate)
            .with_pitch(self.pitch)
            .with_volume_gain_db(self.volume_gain_db)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypesetSettings {
    #[serde(default = "default_latex_program")]
    pub program: String,

    /// Two passes resolve the table of contents
    #[serde(default = "default_passes")]
    pub passes: usize,
}

fn default_latex_program() -> String {
    "pdflatex".to_string()
}

fn default_passes() -> usize {
    2
}

impl Default for TypesetSettings {
    fn default() -> Self {
        Self {
            program: default_latex_program(),
            passes: default_passes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
        }
    }
}

impl CapsuleConfig {
    /// Get the config file path: ~/.config/cli-programs/capsules.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("cli-programs").join("capsules.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: CapsuleConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CapsuleConfig::default();
        assert_eq!(config.speech.voice, "fr-FR-Standard-B");
        assert_eq!(config.speech.segment_budget, 4000);
        assert_eq!(config.speech.pause_ms, 500);
        assert_eq!(config.typeset.passes, 2);
        assert_eq!(config.audio.ffmpeg, "ffmpeg");
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.speech.api_key.is_none());
    }

    #[test]
    fn test_config_path() {
        let path = CapsuleConfig::config_path();
        assert!(path.is_ok());
        let path = path.unwrap();
        assert!(path.ends_with("cli-programs/capsules.toml"));
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[speech]
voice = "fr-FR-Wavenet-C"
gender = "FEMALE"
speaking_rate = 1.0
segment_budget = 3000

[llm]
model = "gemini-2.0-flash"

[retry]
max_attempts = 5

[typeset]
program = "/usr/bin/pdflatex"
"#;
        let config: CapsuleConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.speech.voice, "fr-FR-Wavenet-C");
        assert_eq!(config.speech.gender, VoiceGender::Female);
        assert_eq!(config.speech.segment_budget, 3000);
        assert_eq!(config.speech.pitch, -2.0);
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_factor, 2.0);
        assert_eq!(config.typeset.program, "/usr/bin/pdflatex");
        assert_eq!(config.typeset.passes, 2);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: CapsuleConfig = toml::from_str("").unwrap();
        assert_eq!(config.speech.speaking_rate, 0.9);
        assert_eq!(config.scrape.max_chars, 10_000);
    }

    #[test]
    fn test_tts_options_from_settings() {
        let speech = SpeechSettings {
            voice: "fr-CA-Standard-A".into(),
            speaking_rate: 9.0,
            ..Default::default()
        };
        let options = speech.tts_options();
        assert_eq!(options.language_code, "fr-CA");
        assert_eq!(options.speaking_rate, 4.0);
    }

    #[test]
    fn test_config_round_trip_through_toml() {
        let mut config = CapsuleConfig::default();
        config.speech.segment_budget = 2500;
        let text = toml::to_string_pretty(&config).unwrap();
        let back: CapsuleConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.speech.segment_budget, 2500);
        assert!(!text.contains("api_key"));
    }
}
