//! Shared fakes for the integration tests.
//!
//! `FakeReader` stands in for pdfium: a "PDF" is `%PDF-1.7\n` followed by
//! page texts separated by form feeds. `FakeModel` returns a canned reply
//! and counts its calls.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_pdf2xlsx::{
    ArtifactStore, ConversionConfig, Document, ModelClient, ModelResponse, PageTextReader,
    Pdf2XlsxError, Pipeline,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const PDF_HEADER: &str = "%PDF-1.7\n";

pub const JANE_DOE: &str =
    r#"[{"key":"Name","value":"Jane Doe","comments":"found in header"}]"#;

/// Bytes of a fake PDF whose pages hold `pages`.
pub fn fake_pdf(pages: &[&str]) -> Vec<u8> {
    format!("{PDF_HEADER}{}", pages.join("\u{c}")).into_bytes()
}

pub fn pdf_document(pages: &[&str]) -> Document {
    Document::new(
        fake_pdf(pages),
        Some("application/pdf".into()),
        Some("doc.pdf".into()),
    )
}

#[derive(Default)]
pub struct FakeReader {
    pub seen: Mutex<Vec<PathBuf>>,
}

impl PageTextReader for FakeReader {
    fn read_pages(&self, path: &Path, _password: Option<&str>) -> Result<Vec<String>, Pdf2XlsxError> {
        self.seen.lock().push(path.to_path_buf());
        let bytes = std::fs::read(path).map_err(|e| Pdf2XlsxError::Internal(e.to_string()))?;
        let text = String::from_utf8_lossy(&bytes);
        let body = text
            .strip_prefix(PDF_HEADER)
            .ok_or_else(|| Pdf2XlsxError::InvalidInput {
                reason: "not a fake PDF".into(),
            })?;
        Ok(body.split('\u{c}').map(str::to_string).collect())
    }
}

pub struct FakeModel {
    reply: Result<String, String>,
    calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
}

impl FakeModel {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn failing(detail: &str) -> Self {
        Self {
            reply: Err(detail.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for FakeModel {
    async fn generate(&self, prompt: &str) -> Result<ModelResponse, Pdf2XlsxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(prompt.to_string());
        match &self.reply {
            Ok(text) => Ok(ModelResponse {
                text: text.clone(),
                input_tokens: 120,
                output_tokens: 40,
                retries: 0,
            }),
            Err(detail) => Err(Pdf2XlsxError::ModelInvocation {
                attempts: 1,
                detail: detail.clone(),
            }),
        }
    }
}

pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub reader: Arc<FakeReader>,
    pub model: Arc<FakeModel>,
    pub store: ArtifactStore,
}

impl Harness {
    pub fn new(model: FakeModel) -> Self {
        Self::with_config(model, ConversionConfig::default())
    }

    pub fn with_config(model: FakeModel, config: ConversionConfig) -> Self {
        let reader = Arc::new(FakeReader::default());
        let model = Arc::new(model);
        let store = ArtifactStore::ephemeral().expect("scratch dir");
        let pipeline = Pipeline::with_components(
            reader.clone(),
            model.clone(),
            store.clone(),
            &config,
        );
        Self {
            pipeline: Arc::new(pipeline),
            reader,
            model,
            store,
        }
    }

    /// Files currently in the scratch directory.
    pub fn scratch_files(&self) -> usize {
        std::fs::read_dir(self.store.root())
            .expect("scratch dir readable")
            .count()
    }
}
