//! Text extraction: pull the text layer out of every page via pdfium.
//!
//! pdfium is a C library with process-global state, so all calls into it
//! happen inside `spawn_blocking`, never on a Tokio worker thread.
//!
//! The engine sits behind [`PageTextReader`] so the rest of the pipeline
//! (and its tests) never needs a real pdfium library.

use crate::error::Pdf2XlsxError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Anything that can turn a PDF on disk into per-page text.
///
/// Implementations are blocking; callers go through [`extract_text`], which
/// moves the call off the async runtime.
pub trait PageTextReader: Send + Sync {
    /// Text of each page, in page order. Pages without a text layer yield
    /// an empty string rather than an error.
    fn read_pages(&self, path: &Path, password: Option<&str>)
        -> Result<Vec<String>, Pdf2XlsxError>;
}

/// All text of a document, pages joined with newlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentText {
    pub text: String,
    pub pages: usize,
}

impl DocumentText {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Join page texts and reject documents with no usable text.
pub fn assemble_text(pages: Vec<String>) -> Result<DocumentText, Pdf2XlsxError> {
    let page_count = pages.len();
    let text = pages.join("\n");
    if text.trim().is_empty() {
        return Err(Pdf2XlsxError::NoExtractableText { pages: page_count });
    }
    Ok(DocumentText {
        text,
        pages: page_count,
    })
}

/// Read `path` with `reader` on the blocking pool and assemble the result.
pub async fn extract_text(
    reader: Arc<dyn PageTextReader>,
    path: &Path,
    password: Option<&str>,
) -> Result<DocumentText, Pdf2XlsxError> {
    let path = path.to_path_buf();
    let password = password.map(str::to_string);

    let pages = tokio::task::spawn_blocking(move || reader.read_pages(&path, password.as_deref()))
        .await
        .map_err(|e| Pdf2XlsxError::Internal(format!("Extraction task panicked: {}", e)))??;

    let document = assemble_text(pages)?;
    debug!(
        "Extracted {} chars from {} page(s)",
        document.char_count(),
        document.pages
    );
    Ok(document)
}

/// [`PageTextReader`] backed by the pdfium shared library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumTextReader {
    library_path: Option<PathBuf>,
}

impl PdfiumTextReader {
    /// Bind using `PDFIUM_LIB_PATH`, then the working directory, then the
    /// system library path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to the library at exactly this path.
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, Pdf2XlsxError> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => Pdfium::bind_to_library(&path).map_err(|e| {
                Pdf2XlsxError::PdfiumBindingFailed(format!("{}: {:?}", path.display(), e))
            })?,
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| Pdf2XlsxError::PdfiumBindingFailed(format!("{:?}", e)))?,
        };
        Ok(Pdfium::new(bindings))
    }
}

impl PageTextReader for PdfiumTextReader {
    fn read_pages(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Vec<String>, Pdf2XlsxError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| load_error(e, password.is_some()))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        info!("PDF loaded: {} pages", total);

        let mut texts = Vec::with_capacity(total);
        for (idx, page) in pages.iter().enumerate() {
            match page.text() {
                Ok(text) => texts.push(text.all()),
                Err(e) => {
                    warn!("Page {}: no text layer ({:?})", idx + 1, e);
                    texts.push(String::new());
                }
            }
        }
        Ok(texts)
    }
}

/// A document pdfium cannot open is the client's problem, whatever the cause.
fn load_error(e: PdfiumError, had_password: bool) -> Pdf2XlsxError {
    let detail = format!("{:?}", e);
    let reason = if detail.contains("Password") || detail.contains("password") {
        if had_password {
            "wrong password for encrypted PDF".to_string()
        } else {
            "PDF is password-protected".to_string()
        }
    } else {
        format!("PDF could not be opened: {}", detail)
    };
    Pdf2XlsxError::invalid_input(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticPages(Vec<&'static str>);

    impl PageTextReader for StaticPages {
        fn read_pages(&self, _: &Path, _: Option<&str>) -> Result<Vec<String>, Pdf2XlsxError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    #[test]
    fn pages_are_joined_with_newlines() {
        let doc = assemble_text(vec!["Name: Jane".into(), "Date: 2024".into()]).unwrap();
        assert_eq!(doc.text, "Name: Jane\nDate: 2024");
        assert_eq!(doc.pages, 2);
    }

    #[test]
    fn blank_pages_are_kept_in_place() {
        let doc = assemble_text(vec!["".into(), "Total: 5".into()]).unwrap();
        assert_eq!(doc.text, "\nTotal: 5");
    }

    #[test]
    fn whitespace_only_document_has_no_text() {
        let err = assemble_text(vec!["  ".into(), "\n\t".into()]).unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::NoExtractableText { pages: 2 }));
    }

    #[test]
    fn zero_page_document_has_no_text() {
        let err = assemble_text(vec![]).unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::NoExtractableText { pages: 0 }));
    }

    #[tokio::test]
    async fn extract_runs_reader_off_the_runtime() {
        let reader: Arc<dyn PageTextReader> = Arc::new(StaticPages(vec!["a: 1", "b: 2"]));
        let doc = extract_text(reader, Path::new("ignored.pdf"), None)
            .await
            .unwrap();
        assert_eq!(doc.text, "a: 1\nb: 2");
        assert_eq!(doc.char_count(), 9);
    }

    #[test]
    fn explicit_missing_library_fails_to_bind() {
        let reader = PdfiumTextReader::with_library_path("/nonexistent/libpdfium.so");
        let err = reader
            .read_pages(Path::new("x.pdf"), None)
            .unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::PdfiumBindingFailed(_)));
    }
}
