//! Batch driver: one document in, one MP3 (or one failure) out.
//!
//! Documents are processed strictly one after another. Each moves through
//! `Pending -> Extracting -> Cleaning -> Synthesizing -> Assembling -> Done`
//! and may fail at any stage; a failure is recorded and the batch moves on.
//! Blocking collaborators (PDF parsing, OCR, FFmpeg) run on the blocking pool
//! under an explicit timeout.

mod summary;

pub use summary::{BatchSummary, DocumentOutcome, DocumentReport, DocumentStage, FailureReason};

use crate::audio::{AudioEncoder, export_audiobook, join_with_silence};
use crate::config::BatchSettings;
use crate::extract::{ExtractedText, InputKind, TextExtractor};
use crate::text::{TextChunk, chunk_sentences, clean_text, split_into_sentences};
use crate::tts::{SpeechSynthesizer, Waveform};
use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Find input documents under `input_dir`, sorted by path.
///
/// PDFs (any case) are always picked up; image files only with
/// `include_images`, since reading them needs OCR. A missing directory yields
/// an empty list.
pub fn discover_inputs(input_dir: &Path, recursive: bool, include_images: bool) -> Result<Vec<PathBuf>> {
    if !input_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(input_dir).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut inputs = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to scan {}", input_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let wanted = match InputKind::from_path(entry.path()) {
            Some(InputKind::Pdf) => true,
            Some(InputKind::Image) => include_images,
            None => false,
        };
        if wanted {
            inputs.push(entry.into_path());
        }
    }

    inputs.sort();
    Ok(inputs)
}

/// One input file: a PDF or an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    /// File name, used in logs and the report
    pub name: String,
}

impl Document {
    pub fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, name }
    }

    /// Title for tags: the file stem.
    pub fn title(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    /// `<output_dir>/<stem>.mp3`
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.mp3", self.title()))
    }
}

/// Drives the pipeline over a list of documents.
pub struct BatchDriver {
    extractor: Arc<dyn TextExtractor>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    encoder: Arc<dyn AudioEncoder>,
    settings: BatchSettings,
    show_progress: bool,
}

impl BatchDriver {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        encoder: Arc<dyn AudioEncoder>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            extractor,
            synthesizer,
            encoder,
            settings,
            show_progress: true,
        }
    }

    /// Show per-chunk progress bars (on by default).
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Process every document in order. Only setup problems (such as an
    /// uncreatable output directory) are errors; document failures are
    /// reported in the summary.
    ///
    /// The first document to map onto an output file owns it; later documents
    /// with the same stem fail instead of overwriting it.
    pub async fn run(&self, documents: &[Document]) -> Result<BatchSummary> {
        std::fs::create_dir_all(&self.settings.output_dir).with_context(|| {
            format!(
                "Failed to create output directory {}",
                self.settings.output_dir.display()
            )
        })?;

        let started_at = Utc::now();
        let total = documents.len();
        let mut reports = Vec::with_capacity(total);
        let mut claimed: HashMap<String, &Document> = HashMap::new();

        for (i, document) in documents.iter().enumerate() {
            eprintln!("\n[{}/{}] {}", i + 1, total, document.name);

            let output = document.output_path(&self.settings.output_dir);
            let outcome = match claimed.get(&output_key(&output)) {
                Some(owner) => DocumentOutcome::Failed {
                    stage: DocumentStage::Pending,
                    reason: FailureReason::OutputConflict {
                        output,
                        owner: owner.path.clone(),
                    },
                },
                None => {
                    claimed.insert(output_key(&output), document);
                    self.process(document).await
                }
            };
            match &outcome {
                DocumentOutcome::Done {
                    output,
                    skipped_chunks,
                    duration_secs,
                    ..
                } => {
                    eprintln!(
                        "  Saved {} ({})",
                        output.display(),
                        format_duration(*duration_secs)
                    );
                    if !skipped_chunks.is_empty() {
                        eprintln!("  {} chunk(s) skipped", skipped_chunks.len());
                    }
                }
                DocumentOutcome::Failed { stage, reason } => {
                    log::error!("{} failed while {:?}: {}", document.name, stage, reason);
                    eprintln!("  Failed: {}", reason);
                }
            }

            reports.push(DocumentReport {
                name: document.name.clone(),
                path: document.path.clone(),
                outcome,
            });
        }

        Ok(BatchSummary {
            started_at,
            finished_at: Utc::now(),
            documents: reports,
        })
    }

    /// Run one document through the pipeline.
    ///
    /// On failure an audiobook left by an earlier run for the same document
    /// is removed.
    pub async fn process(&self, document: &Document) -> DocumentOutcome {
        let mut stage = DocumentStage::Pending;
        match self.pipeline(document, &mut stage).await {
            Ok(outcome) => outcome,
            Err(reason) => {
                self.discard_stale_output(document);
                DocumentOutcome::Failed { stage, reason }
            }
        }
    }

    fn discard_stale_output(&self, document: &Document) {
        let output = document.output_path(&self.settings.output_dir);
        if !output.exists() {
            return;
        }
        match std::fs::remove_file(&output) {
            Ok(()) => log::warn!(
                "{}: removed {} from an earlier run",
                document.name,
                output.display()
            ),
            Err(e) => log::warn!(
                "{}: could not remove stale {}: {}",
                document.name,
                output.display(),
                e
            ),
        }
    }

    async fn pipeline(
        &self,
        document: &Document,
        stage: &mut DocumentStage,
    ) -> std::result::Result<DocumentOutcome, FailureReason> {
        advance(document, stage, DocumentStage::Extracting);
        let extracted = self.extract(document).await?;
        log::info!(
            "{}: {} page(s){}",
            document.name,
            extracted.page_count,
            if extracted.used_ocr { " via OCR" } else { "" }
        );

        advance(document, stage, DocumentStage::Cleaning);
        let chunks = self.prepare(&extracted.text)?;
        log::info!("{}: {} chunk(s)", document.name, chunks.len());

        advance(document, stage, DocumentStage::Synthesizing);
        let (waveforms, skipped_chunks) = self.synthesize(document, &chunks).await?;

        advance(document, stage, DocumentStage::Assembling);
        let output = document.output_path(&self.settings.output_dir);
        let duration_secs = self.assemble(document, waveforms, &output).await?;

        advance(document, stage, DocumentStage::Done);
        Ok(DocumentOutcome::Done {
            output,
            chunks: chunks.len(),
            skipped_chunks,
            duration_secs,
            used_ocr: extracted.used_ocr,
        })
    }

    async fn extract(&self, document: &Document) -> std::result::Result<ExtractedText, FailureReason> {
        let extractor = Arc::clone(&self.extractor);
        let path = document.path.clone();
        let task = tokio::task::spawn_blocking(move || extractor.extract(&path));

        let timeout = self.settings.extraction_timeout;
        match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(FailureReason::ExtractionTimeout(timeout)),
            Ok(Err(join_err)) if join_err.is_panic() => {
                Err(FailureReason::Extraction("PDF parser crashed".to_string()))
            }
            Ok(Err(join_err)) => Err(FailureReason::Extraction(join_err.to_string())),
            Ok(Ok(result)) => result.map_err(FailureReason::from),
        }
    }

    fn prepare(&self, raw: &str) -> std::result::Result<Vec<TextChunk>, FailureReason> {
        let cleaned = clean_text(raw);
        let chars = cleaned.chars().count();
        if chars < self.settings.min_document_chars {
            return Err(FailureReason::NotEnoughText { chars });
        }

        let sentences = split_into_sentences(&cleaned);
        Ok(chunk_sentences(&sentences, self.settings.max_chunk_chars))
    }

    /// Synthesize every chunk; failed chunks are skipped, a timeout is fatal.
    async fn synthesize(
        &self,
        document: &Document,
        chunks: &[TextChunk],
    ) -> std::result::Result<(Vec<Waveform>, Vec<usize>), FailureReason> {
        let pb = self.chunk_progress(chunks.len());
        let timeout = self.settings.synthesis_timeout;
        let mut waveforms = Vec::with_capacity(chunks.len());
        let mut skipped = Vec::new();

        for chunk in chunks {
            let call = self
                .synthesizer
                .synthesize(&chunk.text, &self.settings.synthesis);

            match tokio::time::timeout(timeout, call).await {
                Err(_) => {
                    pb.finish_and_clear();
                    return Err(FailureReason::SynthesisTimeout(timeout));
                }
                Ok(Ok(waveform)) if !waveform.is_empty() => waveforms.push(waveform),
                Ok(Ok(_)) => {
                    log::warn!("{}: chunk {} produced no audio, skipping", document.name, chunk.index);
                    skipped.push(chunk.index);
                }
                Ok(Err(e)) => {
                    log::warn!("{}: chunk {} skipped: {}", document.name, chunk.index, e);
                    skipped.push(chunk.index);
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        if waveforms.is_empty() {
            return Err(FailureReason::NoAudio);
        }
        Ok((waveforms, skipped))
    }

    /// Join and export; returns the audiobook duration in seconds.
    async fn assemble(
        &self,
        document: &Document,
        waveforms: Vec<Waveform>,
        output: &Path,
    ) -> std::result::Result<f64, FailureReason> {
        let joined = join_with_silence(&waveforms, self.settings.silence)
            .map_err(|e| FailureReason::Encoding(format!("{:#}", e)))?;
        drop(waveforms);
        let duration_secs = joined.duration().as_secs_f64();

        let encoder = Arc::clone(&self.encoder);
        let output = output.to_path_buf();
        let title = document.title();
        let task = tokio::task::spawn_blocking(move || {
            export_audiobook(&joined, encoder.as_ref(), &output, &title)
        });

        match task.await {
            Ok(Ok(())) => Ok(duration_secs),
            Ok(Err(e)) => Err(FailureReason::Encoding(format!("{:#}", e))),
            Err(join_err) => Err(FailureReason::Encoding(join_err.to_string())),
        }
    }

    fn chunk_progress(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// Case-folded so that `Paper.mp3` and `paper.mp3` collide on every filesystem.
fn output_key(output: &Path) -> String {
    output.to_string_lossy().to_lowercase()
}

fn advance(document: &Document, stage: &mut DocumentStage, next: DocumentStage) {
    log::debug!("{}: {:?} -> {:?}", document.name, stage, next);
    *stage = next;
}

/// Format seconds as `1h 02m 03s`, `2m 03s` or `3.0s`.
pub fn format_duration(secs: f64) -> String {
    let total = secs.round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{:.1}s", secs)
    }
}
