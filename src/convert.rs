//! Conversion entry points: run one document through every stage.
//!
//! A [`Pipeline`] is built once (at startup, from a [`ConversionConfig`]) and
//! shared by all requests. It holds no per-request state; each call to
//! [`Pipeline::run`] gets its own request id and its own scratch files.

use crate::artifact::{ArtifactStore, OutputArtifact, RequestId};
use crate::config::ConversionConfig;
use crate::error::Pdf2XlsxError;
use crate::output::{ConversionStats, ExtractionResult};
use crate::pipeline::extract::{self, PageTextReader, PdfiumTextReader};
use crate::pipeline::input::{self, Document};
use crate::pipeline::llm::{LlmModelClient, ModelClient};
use crate::pipeline::{parse, tabulate};
use crate::progress::{NoopProgressCallback, ProgressCallback, Stage};
use crate::prompts::build_extraction_prompt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// The assembled conversion pipeline.
pub struct Pipeline {
    reader: Arc<dyn PageTextReader>,
    model: Arc<dyn ModelClient>,
    store: ArtifactStore,
    password: Option<String>,
    sheet_name: String,
    progress: ProgressCallback,
}

/// A finished conversion. The workbook lives in `artifact` and is deleted
/// when the artifact is dropped.
#[derive(Debug)]
pub struct Conversion {
    pub request_id: RequestId,
    pub artifact: OutputArtifact,
    pub result: ExtractionResult,
    pub stats: ConversionStats,
}

impl Pipeline {
    /// Build a pipeline with the pdfium reader and the configured LLM
    /// provider.
    ///
    /// # Errors
    /// [`Pdf2XlsxError::ProviderNotConfigured`] when no provider can be
    /// constructed (typically a missing API key).
    pub fn from_config(config: &ConversionConfig, store: ArtifactStore) -> Result<Self, Pdf2XlsxError> {
        let model = LlmModelClient::from_config(config)?;
        Ok(Self::with_components(
            Arc::new(PdfiumTextReader::new()),
            Arc::new(model),
            store,
            config,
        ))
    }

    /// Build a pipeline from explicit components.
    pub fn with_components(
        reader: Arc<dyn PageTextReader>,
        model: Arc<dyn ModelClient>,
        store: ArtifactStore,
        config: &ConversionConfig,
    ) -> Self {
        Self {
            reader,
            model,
            store,
            password: config.password.clone(),
            sheet_name: config.sheet_name.clone(),
            progress: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Convert one document to a workbook.
    ///
    /// Stages run strictly in order; the first failure is returned and no
    /// later stage runs. The staged PDF is deleted as soon as its text has
    /// been read, and on every error path the partial workbook is deleted
    /// too.
    pub async fn run(&self, document: Document) -> Result<Conversion, Pdf2XlsxError> {
        self.run_with_id(Uuid::new_v4(), document).await
    }

    /// [`run`](Self::run) under a caller-chosen request id, which names the
    /// scratch files. Ids must be unique among in-flight requests.
    pub async fn run_with_id(
        &self,
        request_id: RequestId,
        document: Document,
    ) -> Result<Conversion, Pdf2XlsxError> {
        let span = tracing::info_span!("convert", request_id = %request_id);
        self.run_inner(request_id, document).instrument(span).await
    }

    async fn run_inner(
        &self,
        request_id: RequestId,
        document: Document,
    ) -> Result<Conversion, Pdf2XlsxError> {
        let total_start = Instant::now();
        let mut stats = ConversionStats::default();
        info!(
            "Starting conversion: {} ({} bytes)",
            document.filename().unwrap_or("<unnamed>"),
            document.len()
        );

        // ── Step 1: Validate, stage and extract ──────────────────────────────
        self.progress.on_stage_start(Stage::Extract);
        let extract_start = Instant::now();
        let text = self
            .stage(Stage::Extract, async {
                input::validate(&document)?;
                let scratch = self
                    .store
                    .stage_input(request_id, document.into_bytes())
                    .await?;
                let text = extract::extract_text(
                    Arc::clone(&self.reader),
                    scratch.path(),
                    self.password.as_deref(),
                )
                .await?;
                // The staged PDF is deleted here, before the model is called.
                drop(scratch);
                Ok::<_, Pdf2XlsxError>(text)
            })
            .await?;
        stats.pages = text.pages;
        stats.text_chars = text.char_count();
        stats.extract_duration_ms = extract_start.elapsed().as_millis() as u64;
        self.progress.on_stage_complete(
            Stage::Extract,
            &format!("{} pages, {} chars", stats.pages, stats.text_chars),
        );

        // ── Step 2: Build the prompt ─────────────────────────────────────────
        self.progress.on_stage_start(Stage::Prompt);
        let prompt = build_extraction_prompt(&text.text);
        self.progress
            .on_stage_complete(Stage::Prompt, &format!("{} chars", prompt.len()));

        // ── Step 3: Call the model ───────────────────────────────────────────
        self.progress.on_stage_start(Stage::Model);
        let model_start = Instant::now();
        let response = self.stage(Stage::Model, self.model.generate(&prompt)).await?;
        stats.model_duration_ms = model_start.elapsed().as_millis() as u64;
        stats.input_tokens = response.input_tokens;
        stats.output_tokens = response.output_tokens;
        stats.retries = response.retries;
        self.progress.on_stage_complete(
            Stage::Model,
            &format!(
                "{} input / {} output tokens",
                response.input_tokens, response.output_tokens
            ),
        );

        // ── Step 4: Recover records ──────────────────────────────────────────
        self.progress.on_stage_start(Stage::Parse);
        let result = self
            .stage(Stage::Parse, async { parse::parse_response(&response.text) })
            .await?;
        stats.records = result.len();
        stats.dropped_records = result.dropped();
        self.progress.on_stage_complete(
            Stage::Parse,
            &format!("{} records, {} dropped", result.len(), result.dropped()),
        );

        // ── Step 5: Write the workbook ───────────────────────────────────────
        self.progress.on_stage_start(Stage::Tabulate);
        let artifact = self
            .stage(Stage::Tabulate, self.write(request_id, &result))
            .await?;
        self.progress.on_stage_complete(
            Stage::Tabulate,
            &format!("{} rows", result.len()),
        );

        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        info!(
            "Conversion complete: {} records ({} dropped) from {} pages in {}ms",
            stats.records, stats.dropped_records, stats.pages, stats.total_duration_ms
        );

        Ok(Conversion {
            request_id,
            artifact,
            result,
            stats,
        })
    }

    /// Tabulate and write the workbook into this request's output file.
    async fn write(
        &self,
        request_id: RequestId,
        result: &ExtractionResult,
    ) -> Result<OutputArtifact, Pdf2XlsxError> {
        let table = tabulate::build_table(result)?;
        let sheet_name = self.sheet_name.clone();
        let artifact = self.store.reserve_output(request_id);

        // The guard travels with the blocking task, so the file is removed
        // even if this future is dropped while the task is still writing.
        tokio::task::spawn_blocking(move || {
            tabulate::write_workbook(&table, &sheet_name, artifact.path()).map(|()| artifact)
        })
        .await
        .map_err(|e| Pdf2XlsxError::Internal(format!("Workbook task panicked: {}", e)))?
    }

    /// Await one stage, reporting a failure to the progress callback.
    async fn stage<T>(
        &self,
        stage: Stage,
        fut: impl std::future::Future<Output = Result<T, Pdf2XlsxError>>,
    ) -> Result<T, Pdf2XlsxError> {
        let result = fut.await;
        if let Err(ref e) = result {
            warn!("Stage {} failed: {}", stage, e);
            self.progress.on_stage_error(stage, &e.to_string());
        }
        result
    }
}

/// Convert a local PDF and write the workbook to `output`.
///
/// Returns the statistics of the run; the scratch copy of the workbook is
/// removed once it has been persisted.
pub async fn convert_to_file(
    pipeline: &Pipeline,
    input: &Path,
    output: &Path,
) -> Result<(ExtractionResult, ConversionStats), Pdf2XlsxError> {
    let document = Document::from_path(input).await?;
    let conversion = pipeline.run(document).await?;
    conversion.artifact.persist(output).await?;
    info!("Wrote {}", output.display());
    Ok((conversion.result, conversion.stats))
}
