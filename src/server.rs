//! HTTP API for the chat transport layer.
//!
//! Exposes the boundary operations of the dispatch core as a JSON HTTP API:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Run one message through the pipeline |
//! | `POST` | `/cancel_call` | Cancel a single call by id |
//! | `POST` | `/cancel_all` | Cancel every active call of a session |
//! | `GET`  | `/call_status/{call_sid}` | Cheap status read for polling |
//! | `GET`  | `/calls` | List a session's calls (active by default) |
//! | `GET`  | `/statistics` | Aggregate counts over all calls |
//! | `POST` | `/call_events` | Provider status callback (form-encoded) |
//! | `POST` | `/tts` | Synthesize response text to `audio/mpeg` |
//! | `GET`  | `/audio/{filename}` | Serve a generated call audio asset |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no call registered with id CA42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `forbidden` (403), `not_found` (404),
//! `cancel_rejected` (409), `provider_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the chat UI is served
//! from a different origin than the API.

use axum::{
    extract::{Form, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::audio::{asset_path, SpeechSynthesizer};
use crate::cancel::{cancel_call, cancel_session, SessionCancelReport};
use crate::config::Config;
use crate::error::CancelError;
use crate::models::{CallRecord, CallStatus, Language};
use crate::pipeline::{ChatOutcome, Pipeline};
use crate::registry::RegistryStats;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Build the full API router around the given state.
///
/// Split from [`run_server`] so tests can drive the router in-process.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/cancel_call", post(handle_cancel_call))
        .route("/cancel_all", post(handle_cancel_all))
        .route("/call_status/{call_sid}", get(handle_call_status))
        .route("/calls", get(handle_list_calls))
        .route("/statistics", get(handle_statistics))
        .route("/call_events", post(handle_call_events))
        .route("/tts", post(handle_tts))
        .route("/audio/{filename}", get(handle_audio))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Create providers from configuration and serve until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let config = Arc::new(config.clone());

    let classifier = crate::classifier::create_classifier(&config.classifier)?;
    let synthesizer = crate::audio::create_synthesizer(&config.speech)?;
    let telephony = crate::telephony::create_provider(&config.telephony)?;
    let registry = Arc::new(crate::registry::CallRegistry::new());

    tracing::info!(
        classifier = classifier.name(),
        speech = synthesizer.name(),
        telephony = telephony.name(),
        "providers configured"
    );

    let pipeline = Arc::new(Pipeline::new(
        config.clone(),
        classifier,
        synthesizer.clone(),
        telephony,
        registry,
    ));

    let state = AppState {
        config: config.clone(),
        pipeline,
        synthesizer,
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "CrimeGuard server listening");
    axum::serve(listener, app).await?;
    Ok(())
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

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn forbidden(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::FORBIDDEN,
        code: "forbidden".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn cancel_rejected(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "cancel_rejected".to_string(),
        message: message.into(),
    }
}

fn provider_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "provider_error".to_string(),
        message: message.into(),
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

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default = "default_session")]
    session_id: String,
    #[serde(default)]
    conversation_history: Vec<String>,
}

fn default_session() -> String {
    "default_session".to_string()
}

#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    #[serde(flatten)]
    outcome: ChatOutcome,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let outcome = state
        .pipeline
        .handle_message(&req.message, &req.session_id, &req.conversation_history)
        .await;

    Ok(Json(ChatResponse {
        session_id: req.session_id,
        outcome,
    }))
}

// ============ POST /cancel_call ============

#[derive(Deserialize)]
struct CancelCallRequest {
    call_sid: String,
}

#[derive(Serialize)]
struct CancelCallResponse {
    success: bool,
    call: CallRecord,
}

async fn handle_cancel_call(
    State(state): State<AppState>,
    Json(req): Json<CancelCallRequest>,
) -> Result<Json<CancelCallResponse>, AppError> {
    if req.call_sid.is_empty() {
        return Err(bad_request("call_sid is required"));
    }

    let record = cancel_call(
        state.pipeline.telephony().as_ref(),
        state.pipeline.registry(),
        &req.call_sid,
    )
    .await
    .map_err(|e| match e {
        CancelError::NotFound(_) => not_found(e.to_string()),
        CancelError::Rejected { .. } => cancel_rejected(e.to_string()),
        CancelError::Provider(_) => provider_error(e.to_string()),
    })?;

    Ok(Json(CancelCallResponse {
        success: true,
        call: record,
    }))
}

// ============ POST /cancel_all ============

#[derive(Deserialize)]
struct CancelAllRequest {
    session_id: String,
}

async fn handle_cancel_all(
    State(state): State<AppState>,
    Json(req): Json<CancelAllRequest>,
) -> Result<Json<SessionCancelReport>, AppError> {
    if req.session_id.is_empty() {
        return Err(bad_request("session_id is required"));
    }

    let report = cancel_session(
        state.pipeline.telephony().clone(),
        state.pipeline.registry().clone(),
        &req.session_id,
    )
    .await;

    Ok(Json(report))
}

// ============ GET /call_status/{call_sid} ============

#[derive(Serialize)]
struct CallStatusResponse {
    call_sid: String,
    status: CallStatus,
    duration_seconds: Option<u32>,
}

async fn handle_call_status(
    State(state): State<AppState>,
    Path(call_sid): Path<String>,
) -> Result<Json<CallStatusResponse>, AppError> {
    let record = state
        .pipeline
        .registry()
        .get(&call_sid)
        .map_err(|e| not_found(e.to_string()))?;

    Ok(Json(CallStatusResponse {
        call_sid,
        status: record.status,
        duration_seconds: record.duration_seconds,
    }))
}

// ============ GET /calls ============

#[derive(Deserialize)]
struct ListCallsQuery {
    session_id: String,
    /// When false, include terminal calls too.
    #[serde(default = "default_true")]
    active_only: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
struct ListCallsResponse {
    count: usize,
    calls: Vec<CallRecord>,
}

async fn handle_list_calls(
    State(state): State<AppState>,
    Query(query): Query<ListCallsQuery>,
) -> Json<ListCallsResponse> {
    let registry = state.pipeline.registry();
    let calls = if query.active_only {
        registry.list_active(&query.session_id)
    } else {
        registry.list_session(&query.session_id)
    };

    Json(ListCallsResponse {
        count: calls.len(),
        calls,
    })
}

// ============ GET /statistics ============

async fn handle_statistics(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.pipeline.registry().stats())
}

// ============ POST /call_events ============

/// Status callback as the telephony provider posts it (form-encoded,
/// Twilio field names).
#[derive(Deserialize)]
struct CallEventForm {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "CallStatus")]
    call_status: String,
    #[serde(rename = "CallDuration")]
    call_duration: Option<u32>,
}

#[derive(Serialize)]
struct CallEventResponse {
    applied: bool,
}

/// Provider callbacks are fire-and-forget on the provider side: whatever
/// happens here, answer 200 so the provider does not retry forever. An
/// update that loses the race against a terminal transition is dropped —
/// that is the registry guard doing its job, not an error.
async fn handle_call_events(
    State(state): State<AppState>,
    Form(event): Form<CallEventForm>,
) -> Json<CallEventResponse> {
    let Some(status) = CallStatus::from_provider(&event.call_status) else {
        tracing::warn!(
            call_sid = %event.call_sid,
            status = %event.call_status,
            "callback with unknown status ignored"
        );
        return Json(CallEventResponse { applied: false });
    };

    match state
        .pipeline
        .registry()
        .update_status(&event.call_sid, status, event.call_duration)
    {
        Ok(_) => Json(CallEventResponse { applied: true }),
        Err(e) => {
            tracing::debug!(call_sid = %event.call_sid, error = %e, "callback update dropped");
            Json(CallEventResponse { applied: false })
        }
    }
}

// ============ POST /tts ============

#[derive(Deserialize)]
struct TtsRequest {
    text: String,
    #[serde(default = "default_language")]
    language: Language,
}

fn default_language() -> Language {
    Language::En
}

async fn handle_tts(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Result<Response, AppError> {
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }

    let bytes = state
        .synthesizer
        .synthesize(&req.text, req.language)
        .await
        .map_err(|e| provider_error(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        bytes,
    )
        .into_response())
}

// ============ GET /audio/{filename} ============

async fn handle_audio(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let storage_dir = PathBuf::from(&state.config.speech.storage_dir);
    let path = asset_path(&storage_dir, &filename)
        .ok_or_else(|| forbidden("access denied"))?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| not_found("audio file not found"))?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        bytes,
    )
        .into_response())
}
