//! HTTP surface: `POST /convert-to-excel/` and `GET /health`.
//!
//! The handler reads one multipart file field, runs the shared [`Pipeline`]
//! on it and answers with the workbook bytes. Failures become a JSON body
//! `{"error": ..., "stage": ..., "detail": ...}` with 400 for bad uploads and
//! 500 for everything else.

use crate::convert::Pipeline;
use crate::error::Pdf2XlsxError;
use crate::pipeline::input::Document;
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// MIME type of the returned workbook.
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Fixed download name of the returned workbook.
pub const OUTPUT_FILENAME: &str = "output.xlsx";

/// Response header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Largest accepted request body, in bytes. Default: 25 MiB.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Build the application router around a shared pipeline.
pub fn router(pipeline: Arc<Pipeline>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/convert-to-excel/", post(convert_to_excel))
        .route("/convert-to-excel", post(convert_to_excel))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

/// Serve until Ctrl+C / SIGTERM, then remove any scratch files left behind
/// by requests that were still in flight.
pub async fn serve(pipeline: Arc<Pipeline>, config: ServerConfig) -> std::io::Result<()> {
    let app = router(Arc::clone(&pipeline), config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!("pdf2xlsx listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let swept = pipeline.store().sweep();
    tracing::info!("Server shutdown complete ({} scratch file(s) swept)", swept);
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Convert an uploaded PDF to an Excel workbook.
async fn convert_to_excel(
    State(pipeline): State<Arc<Pipeline>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let headers = [(HeaderName::from_static(REQUEST_ID_HEADER), request_id.to_string())];

    match handle_upload(pipeline, request_id, multipart).await {
        Ok(bytes) => (
            StatusCode::OK,
            headers,
            [
                (header::CONTENT_TYPE, XLSX_MIME.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", OUTPUT_FILENAME),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => (headers, e).into_response(),
    }
}

async fn handle_upload(
    pipeline: Arc<Pipeline>,
    request_id: Uuid,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Vec<u8>, Pdf2XlsxError> {
    let multipart = multipart
        .map_err(|e| Pdf2XlsxError::invalid_input(format!("expected a multipart upload: {}", e)))?;
    let document = read_upload(multipart).await?;

    // Run detached so a client that hangs up does not abort the model call
    // halfway; the request's scratch files are still cleaned up when it ends.
    let conversion = tokio::spawn(async move { pipeline.run_with_id(request_id, document).await })
        .await
        .map_err(|e| Pdf2XlsxError::Internal(format!("Conversion task failed: {}", e)))??;

    let bytes = conversion.artifact.read().await?;
    tracing::debug!(
        "Request {}: returning {} byte workbook ({} records)",
        request_id,
        bytes.len(),
        conversion.stats.records
    );
    Ok(bytes)
}

/// Take the field named `file`, or failing that the first field that
/// carries a filename.
async fn read_upload(mut multipart: Multipart) -> Result<Document, Pdf2XlsxError> {
    let mut fallback: Option<Document> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        Pdf2XlsxError::invalid_input(format!("failed to read upload: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();
        let filename = field.file_name().map(|s| s.to_string());
        let content_type = field.content_type().map(|s| s.to_string());

        tracing::debug!(
            "Received field: name='{}', filename={:?}, content_type={:?}",
            name,
            filename,
            content_type
        );

        let is_file = name == "file";
        if !is_file && (filename.is_none() || fallback.is_some()) {
            continue;
        }

        let data = field.bytes().await.map_err(|e| {
            tracing::error!("Failed to read file data: {}", e);
            Pdf2XlsxError::invalid_input(format!("failed to read file data: {}", e))
        })?;
        let document = Document::new(data.to_vec(), content_type, filename);

        if is_file {
            return Ok(document);
        }
        fallback = Some(document);
    }

    fallback.ok_or_else(|| {
        tracing::warn!("No file field found in multipart upload");
        Pdf2XlsxError::invalid_input("no file provided; use the multipart field name 'file'")
    })
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    stage: Option<&'static str>,
    detail: String,
}

impl IntoResponse for Pdf2XlsxError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = if kind.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!("Conversion failed: {}", self);
        } else {
            tracing::warn!("Rejected upload: {}", self);
        }

        let body = ErrorResponse {
            error: kind.as_str(),
            stage: self.stage().map(|s| s.as_str()),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
