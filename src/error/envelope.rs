/*
 * Responsibility
 * - 全レスポンス共通の JSON envelope
 *   { success, data, message, code, errors, correlation_id, debug? }
 * - IntoResponse (HTTP status は code から決める)
 */
use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name → messages.
pub type ErrorMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub data: Option<Value>,
    pub message: String,
    pub code: u16,
    pub errors: ErrorMap,
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugBlock>,
}

/// Diagnostic payload, only ever attached when diagnostics are enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugBlock {
    pub kind: String,
    pub message: String,
    pub trace: Vec<TraceFrame>,
    #[serde(default)]
    pub causes: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFrame {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Envelope {
    pub fn ok(
        data: Value,
        message: impl Into<String>,
        status: StatusCode,
        correlation_id: Option<&str>,
    ) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
            code: status.as_u16(),
            errors: ErrorMap::new(),
            correlation_id: correlation_id.map(str::to_owned),
            debug: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}
