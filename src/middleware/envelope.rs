/*
 * Responsibility
 * - エラー応答を request 情報 (correlation id / method / url) 付きの envelope に描き直す
 *   - ApiError 由来: response extensions の RenderedFailure を translate し直す
 *   - axum / tower 由来の素の 4xx / 5xx も envelope に変換する (404 / 405 / 413 は専用の kind)
 * - diagnostics 有効時のみ debug block を付ける (method / url / ip / user_agent)
 */
use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::error::{ApiError, FailureKind, RenderedFailure, translate};
use crate::middleware::http::correlation_id;
use crate::state::AppState;

pub async fn render_envelope(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let correlation_id = correlation_id(req.headers());
    let method = req.method().clone();
    let uri = req.uri().clone();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let response = next.run(req).await;

    let ctx = RenderContext {
        correlation_id: correlation_id.as_deref(),
        diagnostics: state.diagnostics,
        method: &method,
        uri: &uri,
        user_agent: user_agent.as_deref(),
        ip,
    };

    if let Some(RenderedFailure(err)) = response.extensions().get::<RenderedFailure>().cloned() {
        return ctx.render(&err, response);
    }

    if is_json(response.headers()) {
        return response;
    }

    match response.status() {
        StatusCode::NOT_FOUND => {
            let err = ApiError::route_not_found(uri.to_string());
            ctx.render(&err, response)
        }
        StatusCode::METHOD_NOT_ALLOWED => {
            let err = ApiError::method_not_allowed(method.as_str(), allowed_methods(response.headers()));
            ctx.render(&err, response)
        }
        StatusCode::PAYLOAD_TOO_LARGE => {
            let err = ApiError::application(
                StatusCode::PAYLOAD_TOO_LARGE,
                "The request body is too large.",
            );
            ctx.render(&err, response)
        }
        status if status.is_client_error() => {
            let err = ApiError::application(status, "");
            ctx.render(&err, response)
        }
        status if status.is_server_error() => {
            let err = ApiError::application(status, FailureKind::Unclassified.spec().message);
            ctx.render(&err, response)
        }
        _ => response,
    }
}

struct RenderContext<'a> {
    correlation_id: Option<&'a str>,
    diagnostics: bool,
    method: &'a Method,
    uri: &'a Uri,
    user_agent: Option<&'a str>,
    ip: Option<IpAddr>,
}

impl RenderContext<'_> {
    fn render(&self, err: &ApiError, original: Response) -> Response {
        let mut envelope = translate(err, self.correlation_id, self.diagnostics);

        if let Some(debug) = envelope.debug.as_mut() {
            debug
                .extra
                .insert("method".into(), Value::from(self.method.as_str()));
            debug
                .extra
                .insert("url".into(), Value::from(self.uri.to_string()));
            debug
                .extra
                .insert("ip".into(), Value::from(self.ip.map(|ip| ip.to_string())));
            debug
                .extra
                .insert("user_agent".into(), Value::from(self.user_agent));
        }

        let status = envelope.status();
        if status.is_server_error() {
            tracing::error!(
                kind = %err.kind(),
                error = %err,
                correlation_id = self.correlation_id,
                "request failed"
            );
        } else {
            tracing::debug!(
                kind = %err.kind(),
                status = status.as_u16(),
                correlation_id = self.correlation_id,
                "request rejected"
            );
        }

        let (parts, _) = original.into_parts();
        let mut res = envelope.into_response();
        for (name, value) in parts.headers.iter() {
            if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
                res.headers_mut().append(name.clone(), value.clone());
            }
        }
        res
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

fn allowed_methods(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::ALLOW)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
        .collect()
}
