/*
 * Responsibility
 * - GET /version (サービス名 / バージョン / 環境、認証なし)
 */
use axum::{extract::State, http::StatusCode};
use serde_json::json;

use crate::api::v1::extractors::CorrelationId;
use crate::error::Envelope;
use crate::state::AppState;

pub async fn version(
    State(state): State<AppState>,
    CorrelationId(correlation_id): CorrelationId,
) -> Envelope {
    Envelope::ok(
        json!({
            "service_name": state.service.name,
            "service_version": state.service.version,
            "environment": state.service.environment,
        }),
        "",
        StatusCode::OK,
        correlation_id.as_deref(),
    )
}
