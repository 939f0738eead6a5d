//! OCR for scanned PDFs and image files via poppler's `pdftoppm` and
//! `tesseract`.

use super::ExtractError;
use crate::text::cleaner::PAGE_BREAK;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Rasterization resolution; tesseract is tuned for 300 DPI input.
const RENDER_DPI: &str = "300";

/// Recognizes the text of every page of a PDF. Blocking.
pub trait OcrEngine: Send + Sync {
    /// Page texts in page order, separated by form feeds.
    fn recognize(&self, pdf_path: &Path) -> Result<String, ExtractError>;

    /// Text of a single image (JPEG, PNG, BMP or TIFF).
    fn recognize_image(&self, image_path: &Path) -> Result<String, ExtractError>;
}

pub struct TesseractOcr {
    language: String,
}

impl TesseractOcr {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
        }
    }

    /// Both external tools are installed and runnable.
    pub fn is_available() -> bool {
        tool_runs("tesseract", "--version") && tool_runs("pdftoppm", "-v")
    }

    fn rasterize(&self, pdf_path: &Path, dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        let output = Command::new("pdftoppm")
            .args(["-png", "-r", RENDER_DPI])
            .arg(pdf_path)
            .arg(dir.join("page"))
            .output()
            .map_err(|e| ExtractError::Ocr(format!("failed to run pdftoppm: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Ocr(format!("pdftoppm failed: {}", stderr.trim())));
        }

        let entries = std::fs::read_dir(dir).map_err(|e| ExtractError::Ocr(e.to_string()))?;
        let mut pages: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("png"))
            .collect();
        // pdftoppm zero-pads page numbers to a common width
        pages.sort();
        Ok(pages)
    }

    fn recognize_page(&self, image: &Path) -> Result<String, String> {
        let output = Command::new("tesseract")
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .map_err(|e| e.to_string())?;

        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, pdf_path: &Path) -> Result<String, ExtractError> {
        let temp_dir = TempDir::new().map_err(|e| ExtractError::Ocr(e.to_string()))?;
        let pages = self.rasterize(pdf_path, temp_dir.path())?;
        if pages.is_empty() {
            return Err(ExtractError::Ocr("no pages rendered".to_string()));
        }

        let pb = ProgressBar::new(pages.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("  OCR [{bar:30}] {pos}/{len} pages") {
            pb.set_style(style.progress_chars("#>-"));
        }

        let mut texts = Vec::with_capacity(pages.len());
        for (i, page) in pages.iter().enumerate() {
            match self.recognize_page(page) {
                Ok(text) => texts.push(text),
                Err(e) => log::warn!("OCR failed for page {}: {}", i + 1, e),
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        log::info!("OCR recognized {}/{} pages", texts.len(), pages.len());
        let separator = PAGE_BREAK.to_string();
        Ok(texts.join(separator.as_str()))
    }

    fn recognize_image(&self, image_path: &Path) -> Result<String, ExtractError> {
        self.recognize_page(image_path)
            .map_err(|e| ExtractError::Ocr(format!("{}: {}", image_path.display(), e)))
    }
}

fn tool_runs(program: &str, version_flag: &str) -> bool {
    Command::new(program)
        .arg(version_flag)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_runs_missing_program() {
        assert!(!tool_runs("definitely-not-a-real-binary-pdf2audio", "--version"));
    }

    #[test]
    fn test_recognize_garbage_fails_or_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let err = TesseractOcr::new("eng").recognize(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Ocr(_)));
    }

    #[test]
    fn test_recognize_missing_image_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.png");

        let err = TesseractOcr::new("eng").recognize_image(&path).unwrap_err();
        match err {
            ExtractError::Ocr(msg) => assert!(msg.contains("missing.png"), "{}", msg),
            other => panic!("expected OCR error, got {:?}", other),
        }
    }
}
