//! Pipeline stages for PDF-to-spreadsheet conversion.
//!
//! Each submodule implements exactly one transformation step and returns
//! `Result<_, Pdf2XlsxError>`; the first failure ends the request.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ prompt ──▶ llm ──▶ parse ──▶ tabulate
//! (bytes)   (pdfium)    (text)    (model) (JSON)    (xlsx)
//! ```
//!
//! 1. [`input`]    reject anything that is not a non-empty PDF
//! 2. [`extract`]  pull the text layer; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`crate::prompts`] wrap the text in the extraction instructions
//! 4. [`llm`]      one model call with retry/backoff; the only stage with
//!    network I/O
//! 5. [`parse`]    recover the JSON array and validate each record
//! 6. [`tabulate`] lay records out as rows and write the workbook

pub mod extract;
pub mod input;
pub mod llm;
pub mod parse;
pub mod tabulate;
