//! Error types for the edgequake-pdf2xlsx library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2XlsxError`] (**fatal**): the request cannot produce a spreadsheet
//!   (bad upload, no text layer, model down, unusable model output). Every
//!   pipeline stage returns `Result<_, Pdf2XlsxError>` and the first failure
//!   ends the request.
//!
//! * [`RecordRejection`] (**non-fatal**): one element of the model's JSON
//!   array was unusable. It is logged and counted, and the remaining records
//!   still make it into the spreadsheet.
//!
//! Each fatal variant belongs to exactly one [`ErrorKind`], which is what
//! the HTTP layer maps to a status code.

use crate::progress::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2xlsx library.
#[derive(Debug, Error)]
pub enum Pdf2XlsxError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The upload is not something the extractor can read: wrong content
    /// type, empty payload, missing `%PDF` header, corrupt or encrypted file.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The PDF opened fine but carries no text layer (scanned / image-only).
    #[error("No extractable text found in the document ({pages} pages); scanned or image-only PDFs are not supported")]
    NoExtractableText { pages: usize },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The model call failed after all retries.
    #[error("Model invocation failed after {attempts} attempt(s): {detail}")]
    ModelInvocation { attempts: u32, detail: String },

    /// The last model attempt exceeded the configured timeout.
    #[error("Model call timed out after {secs}s ({attempts} attempt(s))")]
    ModelTimeout { attempts: u32, secs: u64 },

    /// The configured provider could not be constructed (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Response errors ───────────────────────────────────────────────────
    /// No JSON array could be recovered from the model output.
    #[error("Malformed model response: {reason}")]
    MalformedResponse { reason: String },

    /// The model returned an empty array, or every element was rejected.
    #[error("No records extracted from document ({dropped} invalid record(s) dropped)")]
    EmptyResult { dropped: usize },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The record table could not be turned into a workbook.
    #[error("Spreadsheet serialisation failed: {detail}")]
    Serialization { detail: String },

    /// A scoped scratch file could not be created, written or copied.
    #[error("Scratch file error at '{path}': {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Text extraction needs the pdfium shared library. Either:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium, or\n\
  • Place libpdfium next to the binary, or\n\
  • Install it in a system library directory.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`Pdf2XlsxError`], one per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NoExtractableText,
    ModelInvocation,
    MalformedResponse,
    EmptyResult,
    Serialization,
    Internal,
}

impl ErrorKind {
    /// Stable snake_case identifier, used in HTTP error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NoExtractableText => "no_extractable_text",
            ErrorKind::ModelInvocation => "model_invocation",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::EmptyResult => "empty_result",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Internal => "internal",
        }
    }

    /// `true` when the caller sent something we cannot process (4xx class).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorKind::InvalidInput | ErrorKind::NoExtractableText)
    }
}

impl Pdf2XlsxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Pdf2XlsxError::InvalidInput { .. } => ErrorKind::InvalidInput,
            Pdf2XlsxError::NoExtractableText { .. } => ErrorKind::NoExtractableText,
            Pdf2XlsxError::ModelInvocation { .. } | Pdf2XlsxError::ModelTimeout { .. } => {
                ErrorKind::ModelInvocation
            }
            Pdf2XlsxError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Pdf2XlsxError::EmptyResult { .. } => ErrorKind::EmptyResult,
            Pdf2XlsxError::Serialization { .. } => ErrorKind::Serialization,
            Pdf2XlsxError::ProviderNotConfigured { .. }
            | Pdf2XlsxError::Scratch { .. }
            | Pdf2XlsxError::InvalidConfig(_)
            | Pdf2XlsxError::PdfiumBindingFailed(_)
            | Pdf2XlsxError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The pipeline stage that first observes this error, if it belongs to one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Pdf2XlsxError::InvalidInput { .. }
            | Pdf2XlsxError::NoExtractableText { .. }
            | Pdf2XlsxError::PdfiumBindingFailed(_) => Some(Stage::Extract),
            Pdf2XlsxError::ModelInvocation { .. }
            | Pdf2XlsxError::ModelTimeout { .. }
            | Pdf2XlsxError::ProviderNotConfigured { .. } => Some(Stage::Model),
            Pdf2XlsxError::MalformedResponse { .. } | Pdf2XlsxError::EmptyResult { .. } => {
                Some(Stage::Parse)
            }
            Pdf2XlsxError::Serialization { .. } => Some(Stage::Tabulate),
            Pdf2XlsxError::Scratch { .. }
            | Pdf2XlsxError::InvalidConfig(_)
            | Pdf2XlsxError::Internal(_) => None,
        }
    }

    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        Pdf2XlsxError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Pdf2XlsxError::MalformedResponse {
            reason: reason.into(),
        }
    }

    pub(crate) fn serialization(detail: impl std::fmt::Display) -> Self {
        Pdf2XlsxError::Serialization {
            detail: detail.to_string(),
        }
    }
}

/// Why a single element of the model's JSON array was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordRejection {
    #[error("record {index}: expected a JSON object, got {found}")]
    NotAnObject { index: usize, found: &'static str },

    #[error("record {index}: missing \"key\" field")]
    MissingKey { index: usize },

    #[error("record {index}: \"key\" is empty")]
    EmptyKey { index: usize },

    #[error("record {index}: \"key\" must be a string, got {found}")]
    InvalidKey { index: usize, found: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_kinds() {
        assert!(Pdf2XlsxError::invalid_input("empty upload").kind().is_client_error());
        assert!(Pdf2XlsxError::NoExtractableText { pages: 2 }
            .kind()
            .is_client_error());
        assert!(!Pdf2XlsxError::EmptyResult { dropped: 0 }
            .kind()
            .is_client_error());
        assert!(!Pdf2XlsxError::PdfiumBindingFailed("missing".into())
            .kind()
            .is_client_error());
    }

    #[test]
    fn timeout_is_a_model_invocation_failure() {
        let e = Pdf2XlsxError::ModelTimeout {
            attempts: 3,
            secs: 120,
        };
        assert_eq!(e.kind(), ErrorKind::ModelInvocation);
        assert_eq!(e.stage(), Some(Stage::Model));
        assert!(e.to_string().contains("120s"), "got: {e}");
    }

    #[test]
    fn stage_of_response_errors() {
        assert_eq!(
            Pdf2XlsxError::malformed("no array").stage(),
            Some(Stage::Parse)
        );
        assert_eq!(
            Pdf2XlsxError::EmptyResult { dropped: 4 }.stage(),
            Some(Stage::Parse)
        );
        assert_eq!(
            Pdf2XlsxError::serialization("too many rows").stage(),
            Some(Stage::Tabulate)
        );
        assert_eq!(Pdf2XlsxError::Internal("x".into()).stage(), None);
    }

    #[test]
    fn empty_result_display() {
        let msg = Pdf2XlsxError::EmptyResult { dropped: 2 }.to_string();
        assert!(msg.contains("No records extracted from document"), "got: {msg}");
        assert!(msg.contains('2'), "got: {msg}");
    }

    #[test]
    fn rejection_display() {
        let r = RecordRejection::InvalidKey {
            index: 3,
            found: "array",
        };
        assert_eq!(r.to_string(), "record 3: \"key\" must be a string, got array");
    }
}
