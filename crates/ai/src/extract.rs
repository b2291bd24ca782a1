//! Text extraction boundary.

use thiserror::Error;
use tracing::warn;

/// Extracted text longer than this is truncated before it reaches a prompt.
pub const MAX_EXTRACT_CHARS: usize = 50_000;

/// Turns stored document bytes into prompt-ready text.
///
/// Implementations should normalize whitespace and respect
/// [`MAX_EXTRACT_CHARS`]; [`normalize`] does both.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, ExtractError>;
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file format for text extraction: {0}")]
    UnsupportedFormat(String),

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Collapse whitespace runs and enforce the length cap.
pub fn normalize(text: &str) -> String {
    let mut normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() > MAX_EXTRACT_CHARS {
        warn!(
            chars = normalized.chars().count(),
            "extracted text too long; truncating"
        );
        normalized = normalized.chars().take(MAX_EXTRACT_CHARS).collect();
    }
    normalized
}

/// Extractor for plain-text uploads. Binary formats (PDF, DOCX) are handled
/// by an external extraction service behind this same trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, ExtractError> {
        if !filename.to_lowercase().ends_with(".txt") {
            return Err(ExtractError::UnsupportedFormat(filename.to_string()));
        }
        let text = String::from_utf8_lossy(bytes);
        Ok(normalize(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace() {
        assert_eq!(
            normalize("  Senior\n\nRust   Engineer\t(remote) "),
            "Senior Rust Engineer (remote)"
        );
    }

    #[test]
    fn truncates_at_the_cap() {
        let long = "word ".repeat(MAX_EXTRACT_CHARS);
        assert_eq!(normalize(&long).chars().count(), MAX_EXTRACT_CHARS);
    }

    #[test]
    fn plain_text_only() {
        let extractor = PlainTextExtractor;
        let text = extractor.extract(b"hello  world", "resume.TXT").unwrap();
        assert_eq!(text, "hello world");

        let err = extractor.extract(b"%PDF-1.4", "resume.pdf").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }
}
