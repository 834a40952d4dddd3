//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to the session
//! task. Missing keys fall back to their defaults.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::audio::{
    SampleOverflow, CAPTURE_BLOCK_SIZE, CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE,
};

// ---------------------------------------------------------------------------
// LiveConfig
// ---------------------------------------------------------------------------

/// Default Gemini Live WebSocket endpoint.
pub const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Settings sent to the streaming service when a session opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// WebSocket endpoint of the conversational audio service.
    pub endpoint: String,
    /// Model identifier, e.g. `"models/gemini-2.5-flash-native-audio-preview-09-2025"`.
    pub model: String,
    /// Prebuilt voice used for the assistant's speech.
    pub voice: String,
    /// System instruction given to the assistant.
    pub system_instruction: String,
    /// Ask the service to transcribe the operator's speech.
    pub input_transcription: bool,
    /// Ask the service to transcribe the assistant's speech.
    pub output_transcription: bool,
    /// Seconds allowed for the WebSocket handshake and setup before the
    /// connect fails.
    pub connect_timeout_secs: u64,
    /// API credential. Injected by the application shell; `None` in the
    /// settings file means "take it from the environment".
    pub api_key: Option<String>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_LIVE_ENDPOINT.into(),
            model: "models/gemini-2.5-flash-native-audio-preview-09-2025".into(),
            voice: "Zephyr".into(),
            system_instruction: "You are the support assistant for a plastic recycling \
                extruder. Help the operator with heater temperatures, screw speed, \
                filament diameter and material changeovers. Keep answers short and \
                spoken-friendly."
                .into(),
            input_transcription: true,
            output_transcription: true,
            connect_timeout_secs: 10,
            api_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for the capture and playback pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate of outbound PCM in Hz (the service expects 16 000).
    pub capture_sample_rate: u32,
    /// Rate of inbound PCM in Hz (the service sends 24 000).
    pub playback_sample_rate: u32,
    /// Samples per captured block.
    pub capture_block_size: usize,
    /// Packing of out-of-range samples.
    pub overflow: SampleOverflow,
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
    /// Output device name; `None` means the system default.
    pub output_device: Option<String>,
    /// Captured blocks that may wait for the session task before new ones
    /// are dropped.
    pub capture_queue: usize,
    /// Encoded chunks that may wait for the transport before new ones are
    /// dropped.
    pub outbound_queue: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: CAPTURE_SAMPLE_RATE,
            playback_sample_rate: PLAYBACK_SAMPLE_RATE,
            capture_block_size: CAPTURE_BLOCK_SIZE,
            overflow: SampleOverflow::default(),
            input_device: None,
            output_device: None,
            capture_queue: 32,
            outbound_queue: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use extruder_voice::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Streaming service settings.
    pub live: LiveConfig,
    /// Capture / playback settings.
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Fill in the API key from `key` unless the settings file set one.
    pub fn with_api_key_fallback(mut self, key: Option<String>) -> Self {
        let has_key = self.live.api_key.as_deref().is_some_and(|k| !k.is_empty());
        if !has_key {
            self.live.api_key = key.filter(|k| !k.is_empty());
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// A default `AppConfig` survives a save / load cycle unchanged.
    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(original, loaded);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.live.endpoint, DEFAULT_LIVE_ENDPOINT);
        assert_eq!(cfg.live.voice, "Zephyr");
        assert!(cfg.live.input_transcription);
        assert!(cfg.live.output_transcription);
        assert!(cfg.live.api_key.is_none());
        assert_eq!(cfg.live.connect_timeout_secs, 10);
        assert_eq!(cfg.audio.capture_sample_rate, 16_000);
        assert_eq!(cfg.audio.playback_sample_rate, 24_000);
        assert_eq!(cfg.audio.capture_block_size, 4_096);
        assert_eq!(cfg.audio.overflow, SampleOverflow::Clamp);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[live]\nvoice = \"Puck\"\n\n[audio]\noverflow = \"Wrap\"\n",
        )
        .expect("write");

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.live.voice, "Puck");
        assert_eq!(cfg.live.model, LiveConfig::default().model);
        assert_eq!(cfg.audio.overflow, SampleOverflow::Wrap);
        assert_eq!(cfg.audio.capture_block_size, 4_096);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.live.api_key = Some("test-key".into());
        cfg.live.output_transcription = false;
        cfg.audio.input_device = Some("USB Audio Device".into());
        cfg.audio.capture_queue = 4;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.live.api_key.as_deref(), Some("test-key"));
        assert!(!loaded.live.output_transcription);
        assert_eq!(loaded.audio.input_device.as_deref(), Some("USB Audio Device"));
        assert_eq!(loaded.audio.capture_queue, 4);
    }

    #[test]
    fn api_key_fallback_only_fills_missing_key() {
        let cfg = AppConfig::default().with_api_key_fallback(Some("from-env".into()));
        assert_eq!(cfg.live.api_key.as_deref(), Some("from-env"));

        let mut preset = AppConfig::default();
        preset.live.api_key = Some("from-file".into());
        let cfg = preset.with_api_key_fallback(Some("from-env".into()));
        assert_eq!(cfg.live.api_key.as_deref(), Some("from-file"));

        let cfg = AppConfig::default().with_api_key_fallback(Some(String::new()));
        assert!(cfg.live.api_key.is_none());
    }
}
