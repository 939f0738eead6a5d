//! Text extraction for PDFs and image files.
//!
//! PDFs are read from their text layer, falling back to OCR when it is too
//! thin. Image files are always OCR'd.

pub mod ocr;

use crate::text::cleaner::PAGE_BREAK;
use ocr::OcrEngine;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Image formats tesseract reads directly.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif"];

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The text layer is (nearly) empty and OCR could not help.
    #[error("no extractable text")]
    NoExtractableText,

    #[error("unreadable file: {0}")]
    Unreadable(String),

    #[error("OCR failed: {0}")]
    Ocr(String),
}

/// Kind of input file, by extension (any case).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if ext == "pdf" {
            Some(InputKind::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(InputKind::Image)
        } else {
            None
        }
    }
}

/// Raw text pulled out of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Page texts separated by form feeds
    pub text: String,
    /// Pages that carried any text
    pub page_count: usize,
    pub used_ocr: bool,
}

impl ExtractedText {
    fn new(text: String, used_ocr: bool) -> Self {
        let page_count = count_pages(&text);
        Self {
            text,
            page_count,
            used_ocr,
        }
    }
}

fn count_pages(text: &str) -> usize {
    text.split(PAGE_BREAK)
        .filter(|page| !page.trim().is_empty())
        .count()
}

/// Turns a document on disk into raw text. Blocking.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractError>;
}

fn ensure_not_empty(path: &Path) -> Result<(), ExtractError> {
    let metadata = std::fs::metadata(path).map_err(|e| ExtractError::Unreadable(e.to_string()))?;
    if metadata.len() == 0 {
        return Err(ExtractError::Unreadable("file is empty".to_string()));
    }
    Ok(())
}

/// Text-layer extraction through `pdf-extract`, with OCR for scanned files.
pub struct PdfTextExtractor {
    ocr: Option<Arc<dyn OcrEngine>>,
    min_text_chars: usize,
}

impl PdfTextExtractor {
    pub fn new(min_text_chars: usize) -> Self {
        Self {
            ocr: None,
            min_text_chars,
        }
    }

    /// Fall back to this engine when the text layer is too thin.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractError> {
        ensure_not_empty(path)?;

        // pdf-extract panics on some malformed inputs instead of returning an error.
        let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_by_pages(path))
            .map_err(|_| ExtractError::Unreadable("PDF parser crashed".to_string()))?
            .map_err(|e| ExtractError::Unreadable(e.to_string()))?;

        let separator = PAGE_BREAK.to_string();
        let direct = pages.join(separator.as_str());
        log::debug!(
            "{}: text layer has {} chars on {} page(s)",
            path.display(),
            direct.trim().chars().count(),
            pages.len()
        );

        resolve_text(direct, path, self.ocr.as_deref(), self.min_text_chars)
    }
}

/// Keep the text layer if it is substantial, else try OCR.
fn resolve_text(
    direct: String,
    path: &Path,
    ocr: Option<&dyn OcrEngine>,
    min_text_chars: usize,
) -> Result<ExtractedText, ExtractError> {
    let found = direct.trim().chars().count();
    if found >= min_text_chars {
        return Ok(ExtractedText::new(direct, false));
    }

    let Some(ocr) = ocr else {
        log::warn!(
            "{}: only {} chars of text and OCR is unavailable",
            path.display(),
            found
        );
        return Err(ExtractError::NoExtractableText);
    };

    log::info!("{}: only {} chars of text, running OCR", path.display(), found);
    let recognized = ocr.recognize(path)?;
    if recognized.trim().is_empty() {
        return Err(ExtractError::NoExtractableText);
    }

    Ok(ExtractedText::new(recognized, true))
}

/// OCR for photographed or scanned pages saved as images.
pub struct ImageTextExtractor {
    ocr: Arc<dyn OcrEngine>,
}

impl ImageTextExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr }
    }
}

impl TextExtractor for ImageTextExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractError> {
        ensure_not_empty(path)?;

        let recognized = self.ocr.recognize_image(path)?;
        if recognized.trim().is_empty() {
            log::warn!("{}: no text found in image", path.display());
            return Err(ExtractError::NoExtractableText);
        }
        Ok(ExtractedText::new(recognized, true))
    }
}

/// Sends each file to the extractor for its [`InputKind`].
pub struct DocumentExtractor {
    pdf: PdfTextExtractor,
    image: Option<ImageTextExtractor>,
}

impl DocumentExtractor {
    /// With an OCR engine, scanned PDFs and images become readable.
    pub fn new(min_text_chars: usize, ocr: Option<Arc<dyn OcrEngine>>) -> Self {
        match ocr {
            Some(ocr) => Self {
                pdf: PdfTextExtractor::new(min_text_chars).with_ocr(Arc::clone(&ocr)),
                image: Some(ImageTextExtractor::new(ocr)),
            },
            None => Self {
                pdf: PdfTextExtractor::new(min_text_chars),
                image: None,
            },
        }
    }
}

impl TextExtractor for DocumentExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractError> {
        match (InputKind::from_path(path), &self.image) {
            (Some(InputKind::Image), Some(image)) => image.extract(path),
            (Some(InputKind::Image), None) => Err(ExtractError::NoExtractableText),
            _ => self.pdf.extract(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FixedOcr {
        text: String,
        calls: AtomicUsize,
    }

    impl FixedOcr {
        fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl OcrEngine for FixedOcr {
        fn recognize(&self, _pdf_path: &Path) -> Result<String, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.clone())
        }

        fn recognize_image(&self, _image_path: &Path) -> Result<String, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.clone())
        }
    }

    /// Writes a PDF whose pages each carry a header, a body line and a footer.
    fn write_pdf(path: &Path, pages: &[[&str; 3]]) {
        use lopdf::content::{Content, Operation};
        use lopdf::{Document, Object, Stream, dictionary};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for [header, body, footer] in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 760.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*header)]),
                    Operation::new("Td", vec![0.into(), (-60).into()]),
                    Operation::new("Tj", vec![Object::string_literal(*body)]),
                    Operation::new("Td", vec![0.into(), (-660).into()]),
                    Operation::new("Tj", vec![Object::string_literal(*footer)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        let page_tree = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(page_tree));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_text_layer_keeps_page_breaks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("journal.pdf");
        write_pdf(
            &path,
            &[
                ["Journal of Examples", "First page body text here.", "Preprint"],
                ["Journal of Examples", "Second page body text here.", "Preprint"],
                ["Journal of Examples", "Third page body text here.", "Preprint"],
                ["Journal of Examples", "Fourth page body text here.", "Preprint"],
            ],
        );

        let extracted = PdfTextExtractor::new(20).extract(&path).unwrap();
        assert!(!extracted.used_ocr);
        assert_eq!(extracted.page_count, 4);

        let pages: Vec<&str> = extracted.text.split(PAGE_BREAK).collect();
        assert_eq!(pages.len(), 4);
        assert!(pages[0].contains("First page body text here."));
        assert!(pages[3].contains("Fourth page body text here."));

        assert_eq!(
            crate::text::clean_text(&extracted.text),
            "First page body text here. Second page body text here. \
             Third page body text here. Fourth page body text here."
        );
    }

    #[test]
    fn test_blank_pdf_without_ocr_has_no_text() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scan.pdf");
        write_pdf(&path, &[["", "", ""]]);

        let err = PdfTextExtractor::new(100).extract(&path).unwrap_err();
        assert!(matches!(err, ExtractError::NoExtractableText));
    }

    #[test]
    fn test_input_kind_from_extension() {
        assert_eq!(InputKind::from_path(Path::new("a/paper.PDF")), Some(InputKind::Pdf));
        assert_eq!(InputKind::from_path(Path::new("photo.jpeg")), Some(InputKind::Image));
        assert_eq!(InputKind::from_path(Path::new("scan.TIF")), Some(InputKind::Image));
        assert_eq!(InputKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(InputKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_image_is_ocrd() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("photo.png");
        std::fs::write(&path, b"png bytes").unwrap();

        let ocr = Arc::new(FixedOcr::new("A photographed page of text."));
        let extracted = ImageTextExtractor::new(ocr.clone()).extract(&path).unwrap();
        assert!(extracted.used_ocr);
        assert_eq!(extracted.page_count, 1);
        assert_eq!(extracted.text, "A photographed page of text.");
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blank_image_has_no_text() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blank.png");
        std::fs::write(&path, b"png bytes").unwrap();

        let err = ImageTextExtractor::new(Arc::new(FixedOcr::new("  \n")))
            .extract(&path)
            .unwrap_err();
        assert!(matches!(err, ExtractError::NoExtractableText));
    }

    #[test]
    fn test_document_extractor_routes_by_kind() {
        let temp = TempDir::new().unwrap();
        let image = temp.path().join("photo.jpg");
        std::fs::write(&image, b"jpeg bytes").unwrap();
        let pdf = temp.path().join("broken.pdf");
        std::fs::write(&pdf, b"this is not a pdf at all").unwrap();

        let ocr: Arc<dyn OcrEngine> = Arc::new(FixedOcr::new("Text in a photo."));
        let extractor = DocumentExtractor::new(100, Some(ocr));
        assert_eq!(extractor.extract(&image).unwrap().text, "Text in a photo.");
        assert!(matches!(
            extractor.extract(&pdf).unwrap_err(),
            ExtractError::Unreadable(_)
        ));

        let without_ocr = DocumentExtractor::new(100, None);
        assert!(matches!(
            without_ocr.extract(&image).unwrap_err(),
            ExtractError::NoExtractableText
        ));
    }

    #[test]
    fn test_zero_byte_file_is_unreadable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("paper.pdf");
        std::fs::write(&path, b"").unwrap();

        let err = PdfTextExtractor::new(100).extract(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable(_)));
    }

    #[test]
    fn test_garbage_file_is_unreadable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf at all").unwrap();

        let err = PdfTextExtractor::new(100).extract(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable(_)));
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = PdfTextExtractor::new(100)
            .extract(Path::new("/nonexistent/file.pdf"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable(_)));
    }

    #[test]
    fn test_substantial_text_skips_ocr() {
        let ocr = FixedOcr::new("should not be used");
        let direct = "Words on a page. ".repeat(10);
        let out = resolve_text(direct.clone(), Path::new("a.pdf"), Some(&ocr), 100).unwrap();
        assert_eq!(out.text, direct);
        assert!(!out.used_ocr);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_thin_text_without_ocr_has_no_text() {
        let err = resolve_text("  Title  ".to_string(), Path::new("a.pdf"), None, 100).unwrap_err();
        assert!(matches!(err, ExtractError::NoExtractableText));
        assert_eq!(err.to_string(), "no extractable text");
    }

    #[test]
    fn test_thin_text_falls_back_to_ocr() {
        let ocr = FixedOcr::new("Page one text.\x0CPage two text.");
        let out = resolve_text(String::new(), Path::new("scan.pdf"), Some(&ocr), 100).unwrap();
        assert!(out.used_ocr);
        assert_eq!(out.page_count, 2);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blank_ocr_result_has_no_text() {
        let ocr = FixedOcr::new(" \n\x0C ");
        let err = resolve_text(String::new(), Path::new("scan.pdf"), Some(&ocr), 100).unwrap_err();
        assert!(matches!(err, ExtractError::NoExtractableText));
    }

    #[test]
    fn test_count_pages_ignores_blank_pages() {
        assert_eq!(count_pages("one\x0C\x0C two \x0C\n"), 2);
        assert_eq!(count_pages(""), 0);
    }
}
