mod common;

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderValue, Request, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::json;

use common::{config, get, now, router, send, sign};

#[tokio::test]
async fn valid_token_reaches_the_handler() {
    let config = config(&[]);
    let token = sign(&config, &json!({"sub": "user-42", "exp": now() + 3600, "role": "admin"}));

    let res = get(router(&config), "/api/v1/me", Some(&format!("Bearer {token}"))).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["success"], json!(true));
    assert_eq!(res.body["code"], json!(200));
    assert_eq!(res.body["data"]["sub"], json!("user-42"));
    assert_eq!(res.body["data"]["role"], json!("admin"));
    assert_eq!(res.body["errors"], json!({}));
}

#[tokio::test]
async fn missing_header_is_unauthenticated() {
    let config = config(&[]);

    let res = get(router(&config), "/api/v1/me", None).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["success"], json!(false));
    assert_eq!(res.body["data"], json!(null));
    assert_eq!(res.body["message"], json!("Authentication required."));
    assert_eq!(res.body["code"], json!(401));
}

#[tokio::test]
async fn wrong_scheme_and_empty_token_are_unauthenticated() {
    let config = config(&[]);

    for header in ["Basic dXNlcjpwYXNz", "bearer abc", "Bearer ", "Bearer    "] {
        let res = get(router(&config), "/api/v1/me", Some(header)).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED, "{header}");
        assert_eq!(res.body["message"], json!("Authentication required."), "{header}");
    }
}

#[tokio::test]
async fn token_signed_with_another_key_is_rejected() {
    let config = config(&[]);
    let other = common::config(&[("JWT_PRIVATE_KEY_PATH", "rsa_other_private.pem")]);
    let token = sign(&other, &json!({"sub": "user-42", "exp": now() + 3600}));

    let res = get(router(&config), "/api/v1/me", Some(&format!("Bearer {token}"))).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], json!("Invalid token signature."));
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let config = config(&[]);
    let token = sign(&config, &json!({"sub": "user-42", "exp": now() - 3600}));

    let res = get(router(&config), "/api/v1/me", Some(&format!("Bearer {token}"))).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], json!("Token has expired."));
}

#[tokio::test]
async fn garbage_signature_is_rejected() {
    let config = config(&[]);
    let token = sign(&config, &json!({"sub": "user-42", "exp": now() + 3600}));
    let (signed, _) = token.rsplit_once('.').unwrap();
    let forged = format!("{signed}.{}", "A".repeat(342));

    let res = get(router(&config), "/api/v1/me", Some(&format!("Bearer {forged}"))).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], json!("Invalid token signature."));
}

#[tokio::test]
async fn token_just_past_expiry_is_within_leeway() {
    let config = config(&[]);
    let token = sign(&config, &json!({"sub": "user-42", "exp": now() - 1}));

    let res = get(router(&config), "/api/v1/me", Some(&format!("Bearer {token}"))).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["sub"], json!("user-42"));
}

#[tokio::test]
async fn future_token_is_rejected() {
    let config = config(&[]);
    let token = sign(&config, &json!({"sub": "user-42", "nbf": now() + 3600}));

    let res = get(router(&config), "/api/v1/me", Some(&format!("Bearer {token}"))).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], json!("Token not yet valid."));
}

#[tokio::test]
async fn malformed_token_is_rejected_with_detail() {
    let config = config(&[]);

    let res = get(router(&config), "/api/v1/me", Some("Bearer not-a-jwt")).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    let message = res.body["message"].as_str().unwrap();
    assert!(message.starts_with("Malformed token: "), "{message}");
}

#[tokio::test]
async fn missing_public_key_is_a_server_error() {
    let config = config(&[("JWT_PUBLIC_KEY_PATH", "/nonexistent/path/key.pem")]);
    let token = sign(&config, &json!({"sub": "user-42", "exp": now() + 3600}));

    let res = get(router(&config), "/api/v1/me", Some(&format!("Bearer {token}"))).await;

    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        res.body["message"],
        json!(
            "JWT public key not found. Please configure JWT_PUBLIC_KEY_PATH. Path: /nonexistent/path/key.pem"
        )
    );
}

#[tokio::test]
async fn cached_key_source_verifies_tokens() {
    let config = config(&[("JWT_KEY_CACHE", "true")]);
    let token = sign(&config, &json!({"sub": "user-42"}));
    let app = router(&config);

    for _ in 0..2 {
        let res = get(app.clone(), "/api/v1/me", Some(&format!("Bearer {token}"))).await;
        assert_eq!(res.status, StatusCode::OK);
    }
}

#[tokio::test]
async fn correlation_id_is_echoed() {
    let config = config(&[]);
    let request = Request::builder()
        .uri("/api/v1/me")
        .header("x-correlation-id", "corr-123")
        .body(Body::empty())
        .unwrap();

    let res = send(router(&config), request).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["correlation_id"], json!("corr-123"));
    assert_eq!(res.headers["x-correlation-id"], "corr-123");
}

#[tokio::test]
async fn correlation_id_is_generated_when_missing() {
    let config = config(&[]);

    let res = get(router(&config), "/health", None).await;

    let header = res.headers["x-correlation-id"].to_str().unwrap().to_string();
    assert!(!header.is_empty());
    assert_eq!(res.body["correlation_id"], json!(header));
}

#[tokio::test]
async fn debug_block_only_with_diagnostics() {
    let quiet = config(&[]);
    let res = get(router(&quiet), "/api/v1/me", Some("Bearer not-a-jwt")).await;
    assert!(res.body.get("debug").is_none());

    let verbose = config(&[("APP_DEBUG", "true")]);
    let res = get(router(&verbose), "/api/v1/me", Some("Bearer not-a-jwt")).await;
    let debug = &res.body["debug"];
    assert_eq!(debug["kind"], json!("MalformedToken"));
    assert_eq!(debug["method"], json!("GET"));
    assert_eq!(debug["url"], json!("/api/v1/me"));
    assert!(!debug["trace"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn undecodable_header_hides_library_text() {
    let config = config(&[]);
    let token = format!(
        "{}.{}.c2ln",
        URL_SAFE_NO_PAD.encode(json!({"alg": "RS256", "typ": 5}).to_string()),
        URL_SAFE_NO_PAD.encode(json!({"sub": "u"}).to_string()),
    );

    let res = get(router(&config), "/api/v1/me", Some(&format!("Bearer {token}"))).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        res.body["message"],
        json!("Malformed token: token could not be decoded")
    );
    assert!(!res.body.to_string().contains("JSON"));
}

#[tokio::test]
async fn expiry_beyond_calendar_range_is_accepted() {
    let config = config(&[]);
    let token = sign(&config, &json!({"sub": "user-1", "exp": 10_000_000_000_000_i64}));

    let res = get(router(&config), "/api/v1/me", Some(&format!("Bearer {token}"))).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["sub"], json!("user-1"));
}

#[tokio::test]
async fn correlation_id_is_not_trimmed() {
    let config = config(&[]);
    let request = Request::builder()
        .uri("/api/v1/me")
        .header("x-correlation-id", " abc ")
        .body(Body::empty())
        .unwrap();

    let res = send(router(&config), request).await;

    assert_eq!(res.headers["x-correlation-id"], " abc ");
    assert_eq!(res.body["correlation_id"], json!(" abc "));
}

#[tokio::test]
async fn non_utf8_correlation_id_is_decoded_lossily() {
    let config = config(&[]);
    let request = Request::builder()
        .uri("/api/v1/me")
        .header(
            "x-correlation-id",
            HeaderValue::from_bytes(b"caf\xe9-1").unwrap(),
        )
        .body(Body::empty())
        .unwrap();

    let res = send(router(&config), request).await;

    assert_eq!(res.headers["x-correlation-id"].as_bytes(), b"caf\xe9-1");
    assert_eq!(res.body["correlation_id"], json!("caf\u{FFFD}-1"));
}

#[tokio::test]
async fn debug_block_records_client_details() {
    let config = config(&[("APP_DEBUG", "true")]);
    let request = Request::builder()
        .uri("/api/v1/me")
        .header(header::USER_AGENT, "gate-tests/1.0")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4321))))
        .body(Body::empty())
        .unwrap();

    let res = send(router(&config), request).await;

    let debug = &res.body["debug"];
    assert_eq!(debug["kind"], json!("Unauthenticated"));
    assert_eq!(debug["user_agent"], json!("gate-tests/1.0"));
    assert_eq!(debug["ip"], json!("127.0.0.1"));
}

#[tokio::test]
async fn debug_block_without_client_details_uses_null() {
    let config = config(&[("APP_DEBUG", "true")]);

    let res = get(router(&config), "/api/v1/me", None).await;

    let debug = &res.body["debug"];
    assert_eq!(debug["user_agent"], json!(null));
    assert_eq!(debug["ip"], json!(null));
}
