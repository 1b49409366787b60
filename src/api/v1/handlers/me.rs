/*
 * Responsibility
 * - GET /api/v1/me (Bearer gate 必須)
 * - 検証済み claims をそのまま返す
 */
use axum::http::StatusCode;

use crate::api::v1::extractors::{AuthClaims, CorrelationId};
use crate::error::{ApiError, Envelope};

pub async fn me(
    CorrelationId(correlation_id): CorrelationId,
    AuthClaims(claims): AuthClaims,
) -> Result<Envelope, ApiError> {
    let data = serde_json::to_value(&claims).map_err(|e| ApiError::internal(e))?;

    Ok(Envelope::ok(
        data,
        "Authenticated.",
        StatusCode::OK,
        correlation_id.as_deref(),
    ))
}
