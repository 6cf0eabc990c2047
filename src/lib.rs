//! # edgequake-pdf2xlsx
//!
//! Extract every key/value fact from a PDF with an LLM and export the result
//! as an Excel workbook.
//!
//! The document's text layer is read with pdfium and handed to a generative
//! model together with strict extraction instructions. The model's reply is
//! recovered as a JSON array, validated record by record, and written as a
//! single worksheet with `key`, `value` and `comments` columns.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Input     content type, non-empty payload, %PDF header
//!  ├─ 2. Extract   text layer of every page via pdfium (spawn_blocking)
//!  ├─ 3. Prompt    fixed extraction rules + document text
//!  ├─ 4. Model     one call with retry/backoff (gemini / openai / anthropic / …)
//!  ├─ 5. Parse     bracket-span recovery, per-record validation
//!  └─ 6. Tabulate  header row + one row per record → .xlsx
//! ```
//!
//! Every request owns two scratch files named after its request id; both are
//! deleted on success and on every error path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2xlsx::{convert_to_file, ArtifactStore, ConversionConfig, Pipeline};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider from EDGEQUAKE_LLM_PROVIDER, defaulting to gemini (GEMINI_API_KEY)
//!     let config = ConversionConfig::default();
//!     let pipeline = Pipeline::from_config(&config, ArtifactStore::ephemeral()?)?;
//!     let (result, stats) =
//!         convert_to_file(&pipeline, Path::new("invoice.pdf"), Path::new("invoice.xlsx")).await?;
//!     eprintln!("{} records, {} dropped", result.len(), stats.dropped_records);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | HTTP endpoint `POST /convert-to-excel/` (axum + tower-http) |
//! | `cli`    | on      | The `pdf2xlsx` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable both when using only the library:
//! ```toml
//! edgequake-pdf2xlsx = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{ArtifactStore, OutputArtifact, RequestId, ScratchInput};
pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert_to_file, Conversion, Pipeline};
pub use error::{ErrorKind, Pdf2XlsxError, RecordRejection};
pub use output::{ConversionStats, ExtractionRecord, ExtractionResult};
pub use pipeline::extract::{DocumentText, PageTextReader, PdfiumTextReader};
pub use pipeline::input::Document;
pub use pipeline::llm::{LlmModelClient, ModelClient, ModelResponse};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
