//! HTTP entry points for the platform's backend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/nodes/{node_id}/documents` | Ingest extracted text into a node |
//! | `POST` | `/answer` | Answer a question against a node |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question is empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (504),
//! `generation_failed` (500), `ingest_failed` (500). The 500 messages are
//! generic; the underlying error is only logged.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use legal_rag_core::answer::{AnswerOptions, AnswerResponse};
use legal_rag_core::chunk::ChunkPreset;
use legal_rag_core::error::RagError;
use legal_rag_core::ingest::{IngestReport, IngestRequest};
use legal_rag_core::models::NewDocument;

use crate::app::App;
use crate::config::Config;

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = App::connect(config).await?;
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(bind = %bind_addr, "HTTP server listening");
    axum::serve(listener, router(app)).await?;

    Ok(())
}

pub fn router(app: App) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/nodes/{node_id}/documents", post(handle_ingest))
        .route("/answer", post(handle_answer))
        .layer(cors)
        .with_state(app)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(err: impl std::fmt::Display) -> AppError {
    tracing::error!(error = %err, "internal error");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: "internal error".to_string(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

/// Map a pipeline error to a response. Anything that is not the caller's
/// fault becomes `failure_code` with a generic message.
fn classify(err: RagError, failure_code: &'static str, failure_message: &str) -> AppError {
    match err {
        RagError::InvalidInput(msg) => bad_request(msg),
        e @ RagError::NotFound { .. } => AppError {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: e.to_string(),
        },
        RagError::Timeout(_) => AppError {
            status: StatusCode::GATEWAY_TIMEOUT,
            code: "timeout",
            message: "the request took too long, please retry".to_string(),
        },
        other => {
            tracing::error!(kind = other.kind(), error = %other, code = failure_code, "request failed");
            AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: failure_code,
                message: failure_message.to_string(),
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /nodes/{node_id}/documents ============

#[derive(Debug, Deserialize)]
struct IngestBody {
    filename: String,
    /// Extracted, plain text of the document.
    text: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    storage_path: Option<String>,
    #[serde(default)]
    preset: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
}

async fn handle_ingest(
    State(app): State<App>,
    Path(node_id): Path<String>,
    body: Result<Json<IngestBody>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestReport>), AppError> {
    let Json(body) = body?;

    let preset = match body.preset.as_deref() {
        Some(name) => name
            .parse::<ChunkPreset>()
            .map_err(|e| bad_request(e.to_string()))?,
        None => app.config.chunking.default_preset,
    };

    let request = IngestRequest {
        node_id,
        chunking: preset.config(),
        document: NewDocument {
            filename: body.filename,
            mime_type: body.mime_type.unwrap_or_else(|| "text/plain".to_string()),
            size_bytes: body.text.len() as i64,
            storage_path: body.storage_path,
            metadata: body.metadata,
        },
        text: body.text,
    };

    let report = app
        .ingestor
        .ingest(request)
        .await
        .map_err(|e| classify(e, "ingest_failed", "document ingestion failed"))?;

    Ok((StatusCode::CREATED, Json(report)))
}

// ============ POST /answer ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerBody {
    node_ids: Vec<String>,
    question: String,
    /// Partial options; missing keys fall back to the configured defaults.
    #[serde(default)]
    options: Option<serde_json::Value>,
}

/// Overlay the keys given by the caller on the configured defaults.
fn merge_options(defaults: &AnswerOptions, given: Option<serde_json::Value>) -> Result<AnswerOptions, AppError> {
    let Some(given) = given else {
        return Ok(defaults.clone());
    };
    let serde_json::Value::Object(overrides) = given else {
        return Err(bad_request("options must be a JSON object"));
    };

    let mut merged = serde_json::to_value(defaults).map_err(internal)?;
    if let serde_json::Value::Object(map) = &mut merged {
        map.extend(overrides);
    }
    serde_json::from_value(merged).map_err(|e| bad_request(format!("invalid options: {}", e)))
}

const GENERATION_FAILED: &str = "generation failed, please try again later";

async fn handle_answer(
    State(app): State<App>,
    body: Result<Json<AnswerBody>, JsonRejection>,
) -> Result<Json<AnswerResponse>, AppError> {
    let Json(body) = body?;
    let options = merge_options(&app.config.answer_defaults(), body.options)?;

    let response = app
        .answer(&body.node_ids, &body.question, &options)
        .await
        .map_err(|e| classify(e, "generation_failed", GENERATION_FAILED))?;

    Ok(Json(response))
}
