//! The single place where a classified failure becomes user-visible text.
//!
//! `translate` looks up the kind's static spec, fills in kind-specific
//! parameters, and builds the envelope. The diagnostic block is assembled
//! only when `diagnostics_enabled` is true.

use std::error::Error as StdError;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::{Map, Value, json};

use super::{ApiError, Conflict, DebugBlock, Envelope, ErrorMap, Failure, Missing, TraceFrame};
use crate::services::auth::KeyError;

pub const MAX_TRACE_FRAMES: usize = 5;
pub const MAX_CAUSES: usize = 5;

pub fn translate(
    err: &ApiError,
    correlation_id: Option<&str>,
    diagnostics_enabled: bool,
) -> Envelope {
    let failure = err.failure();
    let spec = err.kind().spec();

    let status = match failure {
        Failure::DomainRuleViolation { status, .. } | Failure::ApplicationError { status, .. } => {
            *status
        }
        _ => spec.status,
    };

    let message = match failure {
        Failure::MalformedToken { detail } => format!("Malformed token: {detail}"),
        Failure::Key(key) => key_message(key),
        Failure::ResourceNotFound { target } => match target {
            Missing::Resource(Some(name)) => format!("The requested {name} was not found."),
            Missing::Resource(None) => spec.message.to_string(),
            Missing::Route(uri) => format!("The requested endpoint '{uri}' was not found."),
        },
        Failure::MethodNotAllowed { method, .. } => {
            format!("The {method} method is not allowed for this endpoint.")
        }
        Failure::DataConflict { conflict } => match conflict {
            Conflict::Duplicate => spec.message.to_string(),
            Conflict::Referenced => {
                "Cannot delete this resource because it is referenced by other records."
                    .to_string()
            }
        },
        Failure::DomainRuleViolation { message, .. } | Failure::ApplicationError { message, .. }
            if !message.trim().is_empty() =>
        {
            message.clone()
        }
        Failure::Unclassified { detail } if diagnostics_enabled && !detail.trim().is_empty() => {
            detail.clone()
        }
        _ => spec.message.to_string(),
    };

    let errors = match failure {
        Failure::ValidationFailed { errors }
        | Failure::DomainRuleViolation { errors, .. }
        | Failure::ApplicationError { errors, .. } => errors.clone(),
        Failure::MethodNotAllowed { allowed, .. } => {
            ErrorMap::from([("allowed_methods".to_string(), allowed.clone())])
        }
        _ => ErrorMap::new(),
    };

    let debug = diagnostics_enabled.then(|| debug_block(err));

    Envelope {
        success: false,
        data: None,
        message,
        code: status_code(status),
        errors,
        correlation_id: correlation_id.map(str::to_owned),
        debug,
    }
}

fn status_code(status: StatusCode) -> u16 {
    // Caller-supplied statuses outside the error range still render as failures.
    if status.is_client_error() || status.is_server_error() {
        status.as_u16()
    } else {
        StatusCode::INTERNAL_SERVER_ERROR.as_u16()
    }
}

fn key_message(err: &KeyError) -> String {
    match err {
        KeyError::NotFound { role, path } => format!(
            "JWT {role} key not found. Please configure {}. Path: {path}",
            role.env_var()
        ),
        KeyError::Empty { role, path } => format!("JWT {role} key is empty. Path: {path}"),
        KeyError::Unreadable { role, path, .. } => {
            format!("JWT {role} key could not be read. Path: {path}")
        }
        KeyError::Unusable {
            role,
            path,
            algorithm,
            ..
        } => format!("JWT {role} key is not a valid {algorithm} key. Path: {path}"),
    }
}

fn debug_block(err: &ApiError) -> DebugBlock {
    let trace = err
        .trace()
        .iter()
        .take(MAX_TRACE_FRAMES)
        .map(|loc| TraceFrame {
            file: loc.file().to_string(),
            line: loc.line(),
            column: loc.column(),
        })
        .collect();

    let mut causes = Vec::new();
    let mut next = err.source();
    while let Some(cause) = next {
        if causes.len() == MAX_CAUSES {
            break;
        }
        causes.push(cause.to_string());
        next = cause.source();
    }

    let mut extra = Map::new();
    match err.failure() {
        Failure::MethodNotAllowed { allowed, .. } => {
            extra.insert("allowed_methods".into(), json!(allowed));
        }
        Failure::StoreError { code } => {
            extra.insert("store_code".into(), json!(code));
        }
        Failure::DataConflict { conflict } => {
            extra.insert("conflict".into(), json!(format!("{conflict:?}")));
        }
        Failure::Key(key) => {
            extra.insert("key_role".into(), json!(key.role().to_string()));
        }
        _ => {}
    }

    DebugBlock {
        kind: err.kind().name().to_string(),
        message: err.failure().to_string(),
        trace,
        causes,
        timestamp: Utc::now(),
        extra,
    }
}

/// Convenience for transports that only need the JSON body.
pub fn to_json(err: &ApiError, correlation_id: Option<&str>, diagnostics_enabled: bool) -> Value {
    serde_json::to_value(translate(err, correlation_id, diagnostics_enabled))
        .unwrap_or(Value::Null)
}
