//! Waveform joining and MP3 export using FFmpeg.

use crate::bootstrap::ffmpeg as bootstrap_ffmpeg;
use crate::tts::{Waveform, samples_for};
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

/// Every audiobook is encoded at this rate, whatever the synthesizer produced.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Concatenate chunk waveforms with `silence` between each adjacent pair.
///
/// No silence is added before the first or after the last waveform, so the
/// result holds exactly `sum(len) + (n - 1) * silence` samples.
pub fn join_with_silence(waveforms: &[Waveform], silence: Duration) -> Result<Waveform> {
    let Some(first) = waveforms.first() else {
        anyhow::bail!("No audio to assemble");
    };
    let sample_rate = first.sample_rate;

    if let Some(other) = waveforms.iter().find(|w| w.sample_rate != sample_rate) {
        anyhow::bail!(
            "Sample rate mismatch: {} Hz and {} Hz",
            sample_rate,
            other.sample_rate
        );
    }

    let gap = samples_for(silence, sample_rate);
    let total: usize =
        waveforms.iter().map(|w| w.samples.len()).sum::<usize>() + gap * (waveforms.len() - 1);

    let mut samples = Vec::with_capacity(total);
    for (i, waveform) in waveforms.iter().enumerate() {
        if i > 0 {
            samples.resize(samples.len() + gap, 0.0);
        }
        samples.extend_from_slice(&waveform.samples);
    }

    Ok(Waveform::new(samples, sample_rate))
}

/// Encodes a finished waveform into a file.
pub trait AudioEncoder: Send + Sync {
    fn encode(&self, waveform: &Waveform, destination: &Path, title: &str) -> Result<()>;
}

/// MP3 via FFmpeg's libmp3lame.
pub struct FfmpegMp3Encoder {
    ffmpeg: PathBuf,
    bitrate: String,
}

impl Default for FfmpegMp3Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegMp3Encoder {
    /// Use the bootstrapped FFmpeg if present, else the one on PATH.
    pub fn new() -> Self {
        Self {
            ffmpeg: bootstrap_ffmpeg::resolve_ffmpeg(),
            bitrate: "128k".to_string(),
        }
    }

    fn encode_args(&self, wav_path: &Path, destination: &Path, title: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(wav_path.into());
        for arg in ["-codec:a", "libmp3lame", "-b:a", self.bitrate.as_str(), "-ar"] {
            args.push(arg.into());
        }
        args.push(OUTPUT_SAMPLE_RATE.to_string().into());
        args.extend(["-ac", "1", "-metadata"].map(OsString::from));
        args.push(format!("title={}", title).into());
        // Destination may carry a temporary extension
        args.extend(["-metadata", "genre=Audiobook", "-f", "mp3"].map(OsString::from));
        args.push(destination.into());
        args
    }
}

impl AudioEncoder for FfmpegMp3Encoder {
    fn encode(&self, waveform: &Waveform, destination: &Path, title: &str) -> Result<()> {
        let temp_dir = TempDir::new()?;
        let wav_path = temp_dir.path().join("audiobook.wav");
        write_wav(waveform, &wav_path)?;

        let output = Command::new(&self.ffmpeg)
            .args(self.encode_args(&wav_path, destination, title))
            .output()
            .context("Failed to run ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg MP3 encoding failed: {}", stderr.trim());
        }

        Ok(())
    }
}

/// Write mono 16-bit PCM.
pub fn write_wav(waveform: &Waveform, path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).context("Failed to create WAV file")?;
    for sample in &waveform.samples {
        let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(scaled)?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

/// Encode `waveform` to `output_path`, never leaving a partial file behind.
///
/// The encoder writes to `<output>.part`, which is renamed into place only
/// after encoding succeeded.
pub fn export_audiobook(
    waveform: &Waveform,
    encoder: &dyn AudioEncoder,
    output_path: &Path,
    title: &str,
) -> Result<()> {
    let part_path = part_path_for(output_path);

    let result = encoder
        .encode(waveform, &part_path, title)
        .and_then(|()| {
            std::fs::rename(&part_path, output_path)
                .with_context(|| format!("Failed to move audiobook into {}", output_path.display()))
        });

    if result.is_err() && part_path.exists() {
        if let Err(e) = std::fs::remove_file(&part_path) {
            log::warn!("Could not remove {}: {}", part_path.display(), e);
        }
    }

    result
}

fn part_path_for(output_path: &Path) -> PathBuf {
    let mut name = output_path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    output_path.with_file_name(name)
}
