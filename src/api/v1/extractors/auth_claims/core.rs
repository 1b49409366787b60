use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::services::auth::VerifiedClaims;
use crate::state::AppState;

/// Handler で、検証済み claims を受け取るための extractor
/// middleware が VerifiedClaims を request.extensions() に insert 済みである前提
/// 見つからない場合は 401 を返す（gate が掛かっていない route で使われた）
pub struct AuthClaims(pub VerifiedClaims);

impl FromRequestParts<AppState> for AuthClaims
where
    AppState: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedClaims>()
            .cloned()
            .map(AuthClaims)
            .ok_or_else(|| ApiError::unauthenticated())
    }
}
