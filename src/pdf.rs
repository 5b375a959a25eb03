use bytes::Bytes;

use crate::errors::PdfError;

/// Below this many characters the PDF is treated as image-only.
pub const MIN_EXTRACTED_CHARS: usize = 10;

pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Extracts selectable text from an in-memory PDF. CPU-bound; run off the async executor.
pub fn extract_text(data: &Bytes) -> Result<String, PdfError> {
    if !data.starts_with(PDF_MAGIC) {
        return Err(PdfError::Invalid("missing %PDF header".into()));
    }
    // the parser can panic on malformed cross-reference tables
    let text = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(data)
    }))
    .map_err(|_| PdfError::Invalid("parser aborted".into()))?
    .map_err(|e| PdfError::Invalid(e.to_string()))?;
    if text.trim().chars().count() < MIN_EXTRACTED_CHARS {
        return Err(PdfError::NoText);
    }
    tracing::debug!(bytes = data.len(), chars = text.len(), "extracted pdf text");
    Ok(text)
}
