//! Input validation: decide whether an upload is a PDF we can process.
//!
//! Everything here runs before any file is written or any model is called,
//! so a bad upload costs nothing but a 400.

use crate::error::Pdf2XlsxError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The only content type the extractor accepts.
pub const PDF_MIME: &str = "application/pdf";

const PDF_MAGIC: &[u8] = b"%PDF";

/// PDF readers accept the header anywhere in the first KiB.
const MAGIC_SEARCH_WINDOW: usize = 1024;

/// One uploaded PDF: raw bytes plus what the client declared about them.
#[derive(Clone)]
pub struct Document {
    bytes: Vec<u8>,
    content_type: Option<String>,
    filename: Option<String>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("bytes", &self.bytes.len())
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .finish()
    }
}

impl Document {
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        content_type: Option<String>,
        filename: Option<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
            filename,
        }
    }

    /// Load a local file. The content type is inferred: `.pdf` extension or
    /// a `%PDF` header counts as PDF.
    pub async fn from_path(path: &Path) -> Result<Self, Pdf2XlsxError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Pdf2XlsxError::invalid_input(format!("file not found: '{}'", path.display()))
            } else {
                Pdf2XlsxError::Scratch {
                    path: PathBuf::from(path),
                    source: e,
                }
            }
        })?;

        let has_pdf_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        let content_type = if has_pdf_ext || has_pdf_header(&bytes) {
            Some(PDF_MIME.to_string())
        } else {
            None
        };
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());

        debug!("Loaded {} bytes from {}", bytes.len(), path.display());
        Ok(Self::new(bytes, content_type, filename))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Check the declared content type, emptiness and PDF header, in that order.
pub fn validate(document: &Document) -> Result<(), Pdf2XlsxError> {
    match document.content_type() {
        Some(ct) if is_pdf_mime(ct) => {}
        Some(ct) => {
            return Err(Pdf2XlsxError::invalid_input(format!(
                "only PDF files are allowed (got content type '{ct}')"
            )))
        }
        None => {
            return Err(Pdf2XlsxError::invalid_input(
                "only PDF files are allowed (no content type declared)",
            ))
        }
    }

    if document.is_empty() {
        return Err(Pdf2XlsxError::invalid_input("uploaded file is empty"));
    }

    if !has_pdf_header(document.bytes()) {
        let head = &document.bytes()[..document.len().min(4)];
        return Err(Pdf2XlsxError::invalid_input(format!(
            "payload is not a PDF (first bytes: {head:?})"
        )));
    }

    Ok(())
}

/// `%PDF` within the first [`MAGIC_SEARCH_WINDOW`] bytes.
fn has_pdf_header(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(MAGIC_SEARCH_WINDOW)]
        .windows(PDF_MAGIC.len())
        .any(|w| w == PDF_MAGIC)
}

/// Compare the MIME essence, ignoring case and parameters
/// (`Application/PDF; charset=binary` is a PDF).
fn is_pdf_mime(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|essence| essence.eq_ignore_ascii_case(PDF_MIME))
}
