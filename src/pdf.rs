// PDF text extraction collaborator.
// The pipeline only needs "bytes in, text out"; lopdf keeps it pure Rust.

use crate::error::PipelineError;
use lopdf::Document;

/// Seam for the PDF-to-text conversion. Production uses [`LopdfExtractor`];
/// tests inject a stub that returns canned text.
pub trait PdfTextExtractor: Send + Sync {
    fn pdf_to_text(&self, bytes: &[u8]) -> Result<String, PipelineError>;
}

/// Pure-Rust extraction via lopdf.
#[derive(Debug, Default)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    pub fn new() -> Self {
        LopdfExtractor
    }
}

impl PdfTextExtractor for LopdfExtractor {
    fn pdf_to_text(&self, bytes: &[u8]) -> Result<String, PipelineError> {
        let document = Document::load_mem(bytes)
            .map_err(|e| PipelineError::ParseFailure(e.to_string()))?;

        let pages: Vec<u32> = document.get_pages().keys().copied().collect();
        if pages.is_empty() {
            return Err(PipelineError::ParseFailure("PDF sin páginas".to_string()));
        }

        document
            .extract_text(&pages)
            .map_err(|e| PipelineError::ParseFailure(e.to_string()))
    }
}

/// Canned-text extractor for tests and dry runs.
pub struct FixedTextExtractor {
    pub text: String,
}

impl PdfTextExtractor for FixedTextExtractor {
    fn pdf_to_text(&self, _bytes: &[u8]) -> Result<String, PipelineError> {
        Ok(self.text.clone())
    }
}

/// Treats the uploaded bytes as UTF-8 text. Lets the pipeline run over
/// plain-text fixtures where each file carries its own content.
pub struct TextPassthroughExtractor;

impl PdfTextExtractor for TextPassthroughExtractor {
    fn pdf_to_text(&self, bytes: &[u8]) -> Result<String, PipelineError> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_is_parse_failure() {
        let extractor = LopdfExtractor::new();
        let result = extractor.pdf_to_text(b"this is not a pdf");
        assert!(matches!(result, Err(PipelineError::ParseFailure(_))));
    }

    #[test]
    fn test_fixed_extractor_returns_text() {
        let extractor = FixedTextExtractor {
            text: "Legajo 123".to_string(),
        };
        assert_eq!(extractor.pdf_to_text(b"ignored").unwrap(), "Legajo 123");
    }
}
