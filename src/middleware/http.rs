//! HTTP-level middleware (cross-cutting concerns).
//!
//! This module is for transport/infrastructure concerns that should apply to
//! all routes, regardless of API version.
//!
//! Responsibility:
//! - Correlation-Id generation + propagation (x-correlation-id)
//! - Access logging / request tracing (TraceLayer)
//! - Error envelope rendering (see `middleware::envelope`)
//! - Handler panics → `Unclassified` envelope
//! - Body size limits
//! - Global timeouts

use std::{any::Any, time::Duration};

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::http::{HeaderMap, StatusCode, header::HeaderName};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::middleware::envelope;
use crate::state::AppState;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Correlation id of a request exactly as sent. Bytes that are not UTF-8
/// are replaced with U+FFFD.
pub fn correlation_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CORRELATION_ID_HEADER)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_owned());

    tracing::error!(panic = %detail, "request handler panicked");
    ApiError::unclassified(format!("request handler panicked: {detail}")).into_response()
}

/// Apply HTTP-level middleware to the given Router.
///
/// Defaults:
/// - Correlation-Id header: `x-correlation-id` (a UUID is generated when missing)
/// - Body limit: 1 MiB
/// - Timeout: 30 seconds
pub fn apply(router: Router, state: AppState) -> Router {
    let correlation_header = HeaderName::from_static(CORRELATION_ID_HEADER);

    let layers = ServiceBuilder::new()
        // Generate a correlation id if missing, then propagate it to the response.
        .layer(SetRequestIdLayer::new(
            correlation_header.clone(),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(correlation_header))
        // Access log / tracing for all requests.
        .layer(TraceLayer::new_for_http())
        // Every error response leaves here as an envelope.
        .layer(middleware::from_fn_with_state(
            state,
            envelope::render_envelope,
        ))
        .layer(CatchPanicLayer::custom(handle_panic))
        // Make the service error `Infallible` by converting errors into responses.
        .layer(HandleErrorLayer::new(|err: BoxError| async move {
            if err.is::<tower::timeout::error::Elapsed>() {
                ApiError::application(StatusCode::REQUEST_TIMEOUT, "The request timed out.")
            } else {
                ApiError::unclassified(err.to_string())
            }
        }))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES));

    router.layer(layers)
}
