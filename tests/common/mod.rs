#![allow(dead_code)]

use std::path::PathBuf;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::Value;
use tower::ServiceExt;

use bearer_gate::{
    app::{build_router, build_state},
    config::Config,
    services::auth::{FileKeyLoader, KeySource},
};

pub fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/keys")
}

/// Config rooted at the fixture directory, plus any overrides.
pub fn config(overrides: &[(&str, &str)]) -> Config {
    let root = fixtures().display().to_string();
    let mut vars: Vec<(String, String)> = vec![
        ("APP_ROOT".into(), root),
        ("APP_ENV".into(), "development".into()),
        ("APP_DEBUG".into(), "false".into()),
        ("JWT_PUBLIC_KEY_PATH".into(), "rsa_public.pem".into()),
        ("JWT_PRIVATE_KEY_PATH".into(), "rsa_private.pem".into()),
        ("SERVICE_NAME".into(), "bearer-gate-test".into()),
        ("SERVICE_VERSION".into(), "9.9.9".into()),
    ];
    for (key, value) in overrides {
        vars.retain(|(k, _)| k != key);
        vars.push((key.to_string(), value.to_string()));
    }

    Config::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap()
}

pub fn router(config: &Config) -> Router {
    build_router(build_state(config))
}

/// Sign with the private key the config points at.
pub fn sign(config: &Config, claims: &Value) -> String {
    let pem = FileKeyLoader::new(&config.keys).load_private_key().unwrap();
    let key = EncodingKey::from_rsa_pem(&pem).unwrap();
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

pub async fn send(router: Router, request: Request<Body>) -> TestResponse {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(router: Router, uri: &str, authorization: Option<&str>) -> TestResponse {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    send(router, builder.body(Body::empty()).unwrap()).await
}
