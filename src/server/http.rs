//! Health/readiness handlers (spec E.5 supplement, grounded on
//! `original_source/src/voice_ai/api/routes/health.py`'s `/health` and
//! `/ready` endpoints — dropped by the distillation but a standard part
//! of any deployable HTTP service, so carried as ambient stack).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::json;

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

// TODO: probe STT/LLM/TTS upstream connectivity instead of a static reply.
pub async fn ready_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ready" })))
}
