//! Upload checks and text extraction for resume files.

use bytes::Bytes;

use crate::errors::AppError;

use super::word;

pub const MAX_RESUME_BYTES: usize = 10 * 1024 * 1024;

pub const FILE_TOO_LARGE_MESSAGE: &str = "File size exceeds 10MB limit";
pub const INVALID_FILE_TYPE_MESSAGE: &str = "Invalid file type";
pub const NO_TEXT_MESSAGE: &str = "Could not extract text from the resume";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeFormat {
    Pdf,
    Doc,
    Docx,
    PlainText,
}

impl ResumeFormat {
    /// Maps an upload's declared MIME type onto the accepted formats.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/pdf" => Some(Self::Pdf),
            "application/msword" => Some(Self::Doc),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Docx)
            }
            "text/plain" => Some(Self::PlainText),
            _ => None,
        }
    }
}

/// Extracts plain text from an accepted upload. CPU-bound; call from the
/// blocking pool.
pub fn extract_text(format: ResumeFormat, data: &[u8]) -> Result<String, AppError> {
    let text = match format {
        ResumeFormat::Pdf => pdf_extract::extract_text_from_mem(data).map_err(|e| {
            tracing::debug!("PDF extraction failed: {e}");
            unreadable()
        })?,
        ResumeFormat::Docx => word::docx_text(data).map_err(|e| {
            tracing::debug!("DOCX extraction failed: {e}");
            unreadable()
        })?,
        ResumeFormat::Doc => word::doc_text(data).map_err(|e| {
            tracing::debug!("DOC extraction failed: {e}");
            unreadable()
        })?,
        ResumeFormat::PlainText => String::from_utf8(data.to_vec()).map_err(|_| unreadable())?,
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(unreadable());
    }
    Ok(text.to_string())
}

fn unreadable() -> AppError {
    AppError::UnprocessableEntity(NO_TEXT_MESSAGE.to_string())
}

/// Runs `extract_text` on the blocking pool.
pub async fn extract_text_blocking(format: ResumeFormat, data: Bytes) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || extract_text(format, &data))
        .await
        .map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "spawn_blocking failed in text extraction: {e}"
            ))
        })?
}
