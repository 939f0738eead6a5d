//! TTS backend trait and types.

#[cfg(feature = "kokoro")]
pub mod kokoro;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Slowest and fastest speech rates the model handles well.
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

/// Pretrained Kokoro speaker profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Voice {
    /// Clear, pleasant American female voice; suits long-form listening
    #[default]
    AfBella,
    AfHeart,
    AfNicole,
    AfSarah,
    AfSky,
    AmAdam,
    AmMichael,
    BfEmma,
    BfIsabella,
    BmGeorge,
    BmLewis,
}

impl Voice {
    /// Identifier understood by the model.
    pub fn id(&self) -> &'static str {
        match self {
            Voice::AfBella => "af_bella",
            Voice::AfHeart => "af_heart",
            Voice::AfNicole => "af_nicole",
            Voice::AfSarah => "af_sarah",
            Voice::AfSky => "af_sky",
            Voice::AmAdam => "am_adam",
            Voice::AmMichael => "am_michael",
            Voice::BfEmma => "bf_emma",
            Voice::BfIsabella => "bf_isabella",
            Voice::BmGeorge => "bm_george",
            Voice::BmLewis => "bm_lewis",
        }
    }

    /// Kokoro pipeline language: 'a' for American English, 'b' for British.
    pub fn lang_code(&self) -> char {
        match self.id().as_bytes()[0] {
            b'b' => 'b',
            _ => 'a',
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Options for a single synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOptions {
    pub voice: Voice,
    /// Speech rate multiplier (0.5-2.0, default 1.0)
    pub speed: f32,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            voice: Voice::default(),
            speed: 1.0,
        }
    }
}

impl SynthesisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.voice = voice;
        self
    }

    /// Set the speed, clamped to the supported range.
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed.clamp(MIN_SPEED, MAX_SPEED);
        self
    }
}

/// Mono audio with samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Silence of the given length.
    pub fn silence(duration: Duration, sample_rate: u32) -> Self {
        let len = samples_for(duration, sample_rate);
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Number of samples covering `duration` at `sample_rate`, rounded to nearest.
pub fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

/// Synthesis failures. All of them are local to one chunk.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("nothing to synthesize: chunk is empty")]
    EmptyText,

    #[error("model produced no audio")]
    NoAudio,

    #[error("TTS backend error: {0}")]
    Backend(String),
}

/// TTS backend trait - all TTS engines implement this.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one chunk of text into a waveform.
    ///
    /// Identical text, options and model weights give identical output.
    async fn synthesize(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> std::result::Result<Waveform, SynthesisError>;

    /// Backend name for display.
    fn name(&self) -> &'static str;
}

/// Create the TTS backend.
///
/// # Arguments
/// * `device` - Torch device to run the model on ("cpu", "cuda", "mps")
#[cfg(feature = "kokoro")]
pub fn create_backend(device: &str) -> Result<Box<dyn SpeechSynthesizer>> {
    Ok(Box::new(kokoro::KokoroBackend::new(device)?))
}

#[cfg(not(feature = "kokoro"))]
pub fn create_backend(_device: &str) -> Result<Box<dyn SpeechSynthesizer>> {
    anyhow::bail!("pdf2audio was built without the `kokoro` feature; no TTS backend is available")
}
