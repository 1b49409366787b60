//! Bearer token gate: `Authorization` header → TokenVerifier → VerifiedClaims
//! in request extensions.
//!
//! - ヘッダが無い / `Bearer ` で始まらない / token が空 → Unauthenticated
//!   (この場合 verifier は呼ばない)
//! - 検証失敗は VerifyError の種類をそのまま ApiError に載せる

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::{self, Next},
    response::Response,
    routing::MethodRouter,
};

use crate::error::ApiError;
use crate::services::auth::{TokenVerifier, VerifiedClaims};
use crate::state::AppState;

/// Case-sensitive, single space.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Token part of an `Authorization` header value, trimmed. `None` when the
/// header is absent, uses another scheme, or carries an empty token.
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let token = header?.strip_prefix(BEARER_PREFIX)?.trim();
    (!token.is_empty()).then_some(token)
}

/// Authenticate a raw `Authorization` header value.
pub fn authenticate(
    header: Option<&str>,
    verifier: &TokenVerifier,
) -> Result<VerifiedClaims, ApiError> {
    let Some(token) = extract_bearer(header) else {
        tracing::warn!(
            has_header = header.is_some(),
            "request without usable bearer token"
        );
        return Err(ApiError::unauthenticated());
    };

    verifier.verify(token).map_err(|err| {
        let err = ApiError::from(err);
        if err.kind().is_key_failure() {
            tracing::error!(kind = %err.kind(), error = %err, "JWT key problem during verification");
        } else {
            tracing::warn!(kind = %err.kind(), error = %err, "access token verification failed");
        }
        err
    })
}

/// Protect the handlers of one path with the bearer gate.
///
/// 例：
/// ```ignore
/// Router::new().route("/me", middleware::auth::access::protect(get(me), state.clone()))
/// ```
pub fn protect(route: MethodRouter<AppState>, state: AppState) -> MethodRouter<AppState> {
    // MethodRouter::route_layer: 405 fallback は gate を通らない
    route.route_layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let claims = authenticate(header, &state.verifier)?;

    // middleware → extractor への受け渡し
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use serde_json::json;

    use crate::error::FailureKind;
    use crate::services::auth::{FileKeyLoader, KeyLoaderConfig};

    fn fixtures() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/keys")
    }

    fn verifier(public: &str) -> TokenVerifier {
        let mut config = KeyLoaderConfig::new(fixtures());
        config.public_key_path = Some(public.to_string());
        TokenVerifier::new(Arc::new(FileKeyLoader::new(&config)), 60)
    }

    fn token(claims: serde_json::Value) -> String {
        let pem = std::fs::read(fixtures().join("rsa_private.pem")).unwrap();
        let key = EncodingKey::from_rsa_pem(&pem).unwrap();
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key).unwrap()
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(Some("Bearer abc")), Some("abc"));
        assert_eq!(extract_bearer(Some("Bearer   abc  ")), Some("abc"));
        assert_eq!(extract_bearer(None), None);
        assert_eq!(extract_bearer(Some("")), None);
        assert_eq!(extract_bearer(Some("Bearer ")), None);
        assert_eq!(extract_bearer(Some("Bearer    ")), None);
        assert_eq!(extract_bearer(Some("bearer abc")), None);
        assert_eq!(extract_bearer(Some("Basic dXNlcjpwYXNz")), None);
        assert_eq!(extract_bearer(Some("Bearerabc")), None);
    }

    #[test]
    fn test_missing_credentials_never_reach_verifier() {
        // A verifier with no key would report KeyNotFound if it were called.
        let verifier = verifier("/nonexistent/path/key.pem");

        for header in [None, Some(""), Some("Bearer "), Some("Token abc")] {
            let err = authenticate(header, &verifier).unwrap_err();
            assert_eq!(err.kind(), FailureKind::Unauthenticated, "{header:?}");
        }
    }

    #[test]
    fn test_valid_token_is_authenticated() {
        let verifier = verifier("rsa_public.pem");
        let header = format!("Bearer {}", token(json!({"sub": "user-1"})));

        let claims = authenticate(Some(&header), &verifier).unwrap();
        assert_eq!(claims.subject.as_deref(), Some("user-1"));
    }

    #[test]
    fn test_rejections_keep_their_kind() {
        let verifier = verifier("rsa_public.pem");
        let expired = token(json!({"sub": "u", "exp": chrono::Utc::now().timestamp() - 3600}));

        let err = authenticate(Some(&format!("Bearer {expired}")), &verifier).unwrap_err();
        assert_eq!(err.kind(), FailureKind::TokenExpired);

        let err = authenticate(Some("Bearer not-a-jwt"), &verifier).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedToken);
    }

    #[test]
    fn test_missing_key_is_a_key_failure() {
        let verifier = verifier("/nonexistent/path/key.pem");
        let err = authenticate(Some("Bearer anything"), &verifier).unwrap_err();
        assert_eq!(err.kind(), FailureKind::KeyNotFound);
    }
}
