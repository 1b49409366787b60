/*
 * Responsibility
 * - GET /health (疎通用、認証なし)
 */
use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use serde_json::json;

use crate::api::v1::extractors::CorrelationId;
use crate::error::Envelope;
use crate::state::AppState;

pub async fn health(
    State(state): State<AppState>,
    CorrelationId(correlation_id): CorrelationId,
) -> Envelope {
    Envelope::ok(
        json!({
            "status": "ok",
            "service": state.service.name,
            "timestamp": Utc::now().to_rfc3339(),
        }),
        "Service is healthy.",
        StatusCode::OK,
        correlation_id.as_deref(),
    )
}
