/*
 * Responsibility
 * - API バージョンの公開 (v1)
 * - どのルートにも一致しない場合の fallback
 */
use axum::http::Uri;

use crate::error::ApiError;

pub mod v1;

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::route_not_found(uri.to_string())
}
