//! Audio assembly: joining chunk waveforms and exporting MP3 audiobooks.

pub mod assembler;

pub use assembler::{AudioEncoder, FfmpegMp3Encoder, export_audiobook, join_with_silence};
