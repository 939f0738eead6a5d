//! Per-document outcomes and the batch report.

use crate::extract::ExtractError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Where a document is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStage {
    Pending,
    Extracting,
    Cleaning,
    Synthesizing,
    Assembling,
    Done,
}

/// Why a document produced no audiobook.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureReason {
    #[error("no extractable text")]
    NoExtractableText,

    #[error("not enough text to narrate ({chars} characters)")]
    NotEnoughText { chars: usize },

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("extraction timed out after {}s", .0.as_secs())]
    ExtractionTimeout(Duration),

    #[error("synthesis timed out after {}s", .0.as_secs())]
    SynthesisTimeout(Duration),

    #[error("no audio produced")]
    NoAudio,

    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Another document in the same run already writes this output file.
    #[error("{} is already produced from {}", .output.display(), .owner.display())]
    OutputConflict { output: PathBuf, owner: PathBuf },
}

impl From<ExtractError> for FailureReason {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::NoExtractableText => FailureReason::NoExtractableText,
            other => FailureReason::Extraction(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentOutcome {
    Done {
        output: PathBuf,
        chunks: usize,
        /// Indices of chunks that produced no audio
        skipped_chunks: Vec<usize>,
        duration_secs: f64,
        used_ocr: bool,
    },
    Failed {
        stage: DocumentStage,
        #[serde(serialize_with = "serialize_display")]
        reason: FailureReason,
    },
}

fn serialize_display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    /// File name, e.g. `paper.pdf`
    pub name: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: DocumentOutcome,
}

impl DocumentReport {
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, DocumentOutcome::Done { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents: Vec<DocumentReport>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.documents.iter().filter(|d| d.is_done()).count()
    }

    pub fn failed(&self) -> usize {
        self.documents.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents.iter().filter(|d| !d.is_done())
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Write the summary as pretty JSON.
    pub fn write_report(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> BatchSummary {
        let now = Utc::now();
        BatchSummary {
            started_at: now,
            finished_at: now,
            documents: vec![
                DocumentReport {
                    name: "a.pdf".to_string(),
                    path: PathBuf::from("input/a.pdf"),
                    outcome: DocumentOutcome::Done {
                        output: PathBuf::from("output/a.mp3"),
                        chunks: 3,
                        skipped_chunks: vec![1],
                        duration_secs: 12.5,
                        used_ocr: false,
                    },
                },
                DocumentReport {
                    name: "b.pdf".to_string(),
                    path: PathBuf::from("input/b.pdf"),
                    outcome: DocumentOutcome::Failed {
                        stage: DocumentStage::Extracting,
                        reason: FailureReason::NoExtractableText,
                    },
                },
            ],
        }
    }

    #[test]
    fn test_counts() {
        let summary = summary();
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        let failures: Vec<_> = summary.failures().map(|d| d.name.as_str()).collect();
        assert_eq!(failures, vec!["b.pdf"]);
    }

    #[test]
    fn test_report_json_shape() {
        let value = serde_json::to_value(summary()).unwrap();
        let docs = value["documents"].as_array().unwrap();
        assert_eq!(docs[0]["status"], "done");
        assert_eq!(docs[0]["skipped_chunks"][0], 1);
        assert_eq!(docs[1]["status"], "failed");
        assert_eq!(docs[1]["stage"], "extracting");
        assert_eq!(docs[1]["reason"], "no extractable text");
    }

    #[test]
    fn test_write_report() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("report.json");
        summary().write_report(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"name\": \"b.pdf\""));
    }

    #[test]
    fn test_extract_error_mapping() {
        assert_eq!(
            FailureReason::from(ExtractError::NoExtractableText),
            FailureReason::NoExtractableText
        );
        let reason = FailureReason::from(ExtractError::Unreadable("file is empty".to_string()));
        assert_eq!(reason.to_string(), "extraction failed: unreadable file: file is empty");
    }

    #[test]
    fn test_output_conflict_message() {
        let reason = FailureReason::OutputConflict {
            output: PathBuf::from("output/paper.mp3"),
            owner: PathBuf::from("input/a/paper.pdf"),
        };
        assert_eq!(
            reason.to_string(),
            "output/paper.mp3 is already produced from input/a/paper.pdf"
        );
    }

    #[test]
    fn test_timeout_messages() {
        let reason = FailureReason::SynthesisTimeout(Duration::from_secs(300));
        assert_eq!(reason.to_string(), "synthesis timed out after 300s");
    }
}
