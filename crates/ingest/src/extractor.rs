use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("document contains no extractable text")]
    NoText,
    #[error("PDF could not be read: {0}")]
    Unreadable(String),
    #[error("text extraction did not finish within {0:?}")]
    Timeout(Duration),
    #[error("PDF support not built; enable the `pdf` feature")]
    NotAvailable,
}

/// Abstraction over a PDF text-layer extractor.
/// Implementations accept raw PDF bytes and return the embedded text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, pdf_bytes: &[u8]) -> Result<String, ExtractError>;
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set string regardless of input.
pub struct MockExtractor {
    pub text: String,
}

impl MockExtractor {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl TextExtractor for MockExtractor {
    fn extract(&self, _pdf_bytes: &[u8]) -> Result<String, ExtractError> {
        Ok(self.text.clone())
    }
}

/// Stand-in used when the crate is built without the `pdf` feature.
pub struct UnavailableExtractor;

impl TextExtractor for UnavailableExtractor {
    fn extract(&self, _pdf_bytes: &[u8]) -> Result<String, ExtractError> {
        Err(ExtractError::NotAvailable)
    }
}

// ── pdf-extract backend (gated behind `pdf` feature) ──────────────────────────

#[cfg(feature = "pdf")]
pub mod pdf_backend {
    use super::{ExtractError, TextExtractor};

    pub struct PdfTextExtractor;

    impl TextExtractor for PdfTextExtractor {
        fn extract(&self, pdf_bytes: &[u8]) -> Result<String, ExtractError> {
            pdf_extract::extract_text_from_mem(pdf_bytes)
                .map_err(|e| ExtractError::Unreadable(e.to_string()))
        }
    }
}

/// The best extractor this build offers.
pub fn default_extractor() -> Arc<dyn TextExtractor> {
    #[cfg(feature = "pdf")]
    {
        Arc::new(pdf_backend::PdfTextExtractor)
    }
    #[cfg(not(feature = "pdf"))]
    {
        Arc::new(UnavailableExtractor)
    }
}

/// Runs the (blocking) extractor off the async runtime and gives up after
/// `budget`. Text with no visible characters is `NoText`.
pub async fn extract_with_budget(
    extractor: Arc<dyn TextExtractor>,
    pdf_bytes: Vec<u8>,
    budget: Duration,
) -> Result<String, ExtractError> {
    let task = tokio::task::spawn_blocking(move || extractor.extract(&pdf_bytes));
    let text = tokio::time::timeout(budget, task)
        .await
        .map_err(|_| ExtractError::Timeout(budget))?
        .map_err(|e| ExtractError::Unreadable(format!("extraction task failed: {e}")))??;

    if text.chars().all(char::is_whitespace) {
        return Err(ExtractError::NoText);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowExtractor;

    impl TextExtractor for SlowExtractor {
        fn extract(&self, _pdf_bytes: &[u8]) -> Result<String, ExtractError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok("late".into())
        }
    }

    #[test]
    fn mock_returns_preset_text() {
        let e = MockExtractor::new("28.11.2025 -19,90 EUR");
        assert_eq!(e.extract(b"%PDF-1.4").unwrap(), "28.11.2025 -19,90 EUR");
        assert_eq!(e.extract(b"").unwrap(), "28.11.2025 -19,90 EUR");
    }

    #[tokio::test]
    async fn budget_passes_text_through() {
        let text = extract_with_budget(
            Arc::new(MockExtractor::new("hello")),
            vec![],
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn blank_text_is_no_text() {
        let err = extract_with_budget(
            Arc::new(MockExtractor::new(" \n\t")),
            vec![],
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExtractError::NoText));
    }

    #[tokio::test]
    async fn slow_extraction_times_out() {
        let err = extract_with_budget(Arc::new(SlowExtractor), vec![], Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Timeout(_)));
    }

    #[tokio::test]
    async fn unavailable_backend_is_typed() {
        let err = extract_with_budget(
            Arc::new(UnavailableExtractor),
            vec![],
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExtractError::NotAvailable));
    }
}
