//! pdf2audio configuration management.

use crate::tts::{MAX_SPEED, MIN_SPEED, SynthesisOptions, Voice};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Kokoro speaker profile
    #[serde(default)]
    pub voice: Voice,

    /// Speaking rate (0.5-2.0)
    #[serde(default = "default_speed")]
    pub speed: f32,

    /// Directory scanned for PDFs
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Directory receiving one MP3 per PDF
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Character budget per synthesized chunk
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Silence inserted between chunk waveforms
    #[serde(default = "default_silence_ms")]
    pub silence_ms: u64,

    /// Below this many characters the text layer is treated as missing
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,

    /// Below this many cleaned characters a document is not worth narrating
    #[serde(default = "default_min_document_chars")]
    pub min_document_chars: usize,

    #[serde(default = "default_timeout_secs")]
    pub extraction_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub synthesis_timeout_secs: u64,

    /// Torch device for Kokoro (cpu, cuda, mps)
    #[serde(default = "default_device")]
    pub device: String,

    /// Tesseract language pack
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,
}

fn default_speed() -> f32 {
    1.0
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("input")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_max_chunk_chars() -> usize {
    crate::text::DEFAULT_MAX_CHARS
}

fn default_silence_ms() -> u64 {
    400
}

fn default_min_text_chars() -> usize {
    100
}

fn default_min_document_chars() -> usize {
    50
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            voice: Voice::default(),
            speed: default_speed(),
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            max_chunk_chars: default_max_chunk_chars(),
            silence_ms: default_silence_ms(),
            min_text_chars: default_min_text_chars(),
            min_document_chars: default_min_document_chars(),
            extraction_timeout_secs: default_timeout_secs(),
            synthesis_timeout_secs: default_timeout_secs(),
            device: default_device(),
            ocr_language: default_ocr_language(),
        }
    }
}

impl ConverterConfig {
    /// Get the config file path: ~/.config/cli-programs/pdf2audio.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("cli-programs")
            .join("pdf2audio.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: ConverterConfig = toml::from_str(&content)?;
        config.validate()?;
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

    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_chars == 0 {
            anyhow::bail!("max_chunk_chars must be greater than zero");
        }
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            anyhow::bail!(
                "speed must be between {} and {} (got {})",
                MIN_SPEED,
                MAX_SPEED,
                self.speed
            );
        }
        if self.extraction_timeout_secs == 0 || self.synthesis_timeout_secs == 0 {
            anyhow::bail!("timeouts must be at least one second");
        }
        Ok(())
    }
}

/// Everything one batch run needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub recursive: bool,
    pub synthesis: SynthesisOptions,
    pub max_chunk_chars: usize,
    pub silence: Duration,
    pub min_document_chars: usize,
    pub extraction_timeout: Duration,
    pub synthesis_timeout: Duration,
    pub ocr_available: bool,
}

impl BatchSettings {
    pub fn from_config(config: &ConverterConfig, ocr_available: bool) -> Self {
        Self {
            input_dir: config.input_dir.clone(),
            output_dir: config.output_dir.clone(),
            recursive: false,
            synthesis: SynthesisOptions::new()
                .with_voice(config.voice)
                .with_speed(config.speed),
            max_chunk_chars: config.max_chunk_chars,
            silence: Duration::from_millis(config.silence_ms),
            min_document_chars: config.min_document_chars,
            extraction_timeout: Duration::from_secs(config.extraction_timeout_secs),
            synthesis_timeout: Duration::from_secs(config.synthesis_timeout_secs),
            ocr_available,
        }
    }
}
