/*
 * Responsibility
 * - アプリ共通の ApiError 定義 (Failure + 発生箇所 + 原因)
 * - IntoResponse 実装 (translate → Envelope)
 * - KeyError / VerifyError / sqlx::Error を統一的に変換
 */
use std::{error::Error as StdError, fmt, panic::Location, sync::Arc};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::services::auth::{KeyError, VerifyError};

mod envelope;
mod kind;
mod translate;

pub use envelope::{DebugBlock, Envelope, ErrorMap, TraceFrame};
pub use kind::{FailureKind, KindSpec};
pub use translate::{MAX_CAUSES, MAX_TRACE_FRAMES, to_json, translate};

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// What was not found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    /// A domain resource (optionally named, e.g. "user").
    Resource(Option<&'static str>),
    /// An unrouted request target.
    Route(String),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Resource(Some(name)) => write!(f, "{name}"),
            Missing::Resource(None) => f.write_str("resource"),
            Missing::Route(uri) => write!(f, "route {uri}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// Unique constraint.
    Duplicate,
    /// Row is still referenced by a foreign key.
    Referenced,
}

/// A classified failure with the parameters its message needs.
///
/// `Display` is the internal (log) description; user-facing text is produced
/// only by [`translate`].
#[derive(Debug, Error)]
pub enum Failure {
    #[error("missing or unusable credentials")]
    Unauthenticated,
    #[error("token signature mismatch")]
    InvalidSignature,
    #[error("token expired")]
    TokenExpired,
    #[error("token not yet valid")]
    TokenNotYetValid,
    #[error("malformed token: {detail}")]
    MalformedToken { detail: String },
    #[error("{0}")]
    Key(#[source] KeyError),
    #[error("authorization denied")]
    AuthorizationDenied,
    #[error("validation failed for {} field(s)", .errors.len())]
    ValidationFailed { errors: ErrorMap },
    #[error("not found: {target}")]
    ResourceNotFound { target: Missing },
    #[error("method {method} not allowed (allowed: {})", .allowed.join(", "))]
    MethodNotAllowed { method: String, allowed: Vec<String> },
    #[error("data conflict: {conflict:?}")]
    DataConflict { conflict: Conflict },
    #[error("store error (code: {})", .code.as_deref().unwrap_or("none"))]
    StoreError { code: Option<String> },
    #[error("domain rule violated: {message}")]
    DomainRuleViolation {
        status: StatusCode,
        message: String,
        errors: ErrorMap,
    },
    #[error("application error: {message}")]
    ApplicationError {
        status: StatusCode,
        message: String,
        errors: ErrorMap,
    },
    #[error("{detail}")]
    Unclassified { detail: String },
}

impl Failure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Failure::Unauthenticated => FailureKind::Unauthenticated,
            Failure::InvalidSignature => FailureKind::InvalidSignature,
            Failure::TokenExpired => FailureKind::TokenExpired,
            Failure::TokenNotYetValid => FailureKind::TokenNotYetValid,
            Failure::MalformedToken { .. } => FailureKind::MalformedToken,
            Failure::Key(KeyError::NotFound { .. }) => FailureKind::KeyNotFound,
            Failure::Key(KeyError::Empty { .. }) => FailureKind::KeyEmpty,
            Failure::Key(KeyError::Unreadable { .. } | KeyError::Unusable { .. }) => {
                FailureKind::KeyUnavailable
            }
            Failure::AuthorizationDenied => FailureKind::AuthorizationDenied,
            Failure::ValidationFailed { .. } => FailureKind::ValidationFailed,
            Failure::ResourceNotFound { .. } => FailureKind::ResourceNotFound,
            Failure::MethodNotAllowed { .. } => FailureKind::MethodNotAllowed,
            Failure::DataConflict { .. } => FailureKind::DataConflict,
            Failure::StoreError { .. } => FailureKind::StoreError,
            Failure::DomainRuleViolation { .. } => FailureKind::DomainRuleViolation,
            Failure::ApplicationError { .. } => FailureKind::ApplicationError,
            Failure::Unclassified { .. } => FailureKind::Unclassified,
        }
    }
}

/// Error type returned by handlers, middleware and the auth pipeline.
///
/// Carries the classified [`Failure`], the call sites it passed through and
/// an optional underlying cause. Nothing here is user-facing until it goes
/// through [`translate`].
#[derive(Debug)]
pub struct ApiError {
    failure: Failure,
    trace: Vec<&'static Location<'static>>,
    source: Option<BoxError>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.failure)
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.source {
            Some(source) => Some(source.as_ref()),
            None => self.failure.source(),
        }
    }
}

impl ApiError {
    #[track_caller]
    pub fn new(failure: Failure) -> Self {
        Self {
            failure,
            trace: vec![Location::caller()],
            source: None,
        }
    }

    #[track_caller]
    pub fn unauthenticated() -> Self {
        Self::new(Failure::Unauthenticated)
    }

    #[track_caller]
    pub fn forbidden() -> Self {
        Self::new(Failure::AuthorizationDenied)
    }

    #[track_caller]
    pub fn validation(errors: ErrorMap) -> Self {
        Self::new(Failure::ValidationFailed { errors })
    }

    #[track_caller]
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ErrorMap::new();
        errors.insert(field.into(), vec![message.into()]);
        Self::validation(errors)
    }

    #[track_caller]
    pub fn not_found(resource: &'static str) -> Self {
        Self::new(Failure::ResourceNotFound {
            target: Missing::Resource(Some(resource)),
        })
    }

    #[track_caller]
    pub fn route_not_found(uri: impl Into<String>) -> Self {
        Self::new(Failure::ResourceNotFound {
            target: Missing::Route(uri.into()),
        })
    }

    #[track_caller]
    pub fn method_not_allowed(method: impl Into<String>, allowed: Vec<String>) -> Self {
        Self::new(Failure::MethodNotAllowed {
            method: method.into(),
            allowed,
        })
    }

    #[track_caller]
    pub fn conflict(conflict: Conflict) -> Self {
        Self::new(Failure::DataConflict { conflict })
    }

    /// Business-rule violation; 422 unless overridden with [`ApiError::with_status`].
    #[track_caller]
    pub fn domain(message: impl Into<String>) -> Self {
        Self::new(Failure::DomainRuleViolation {
            status: FailureKind::DomainRuleViolation.default_status(),
            message: message.into(),
            errors: ErrorMap::new(),
        })
    }

    #[track_caller]
    pub fn application(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(Failure::ApplicationError {
            status,
            message: message.into(),
            errors: ErrorMap::new(),
        })
    }

    #[track_caller]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::application(FailureKind::ApplicationError.default_status(), message)
    }

    #[track_caller]
    pub fn unclassified(detail: impl Into<String>) -> Self {
        Self::new(Failure::Unclassified {
            detail: detail.into(),
        })
    }

    /// Wrap an arbitrary error as `Unclassified`, keeping it as the cause.
    #[track_caller]
    pub fn internal<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::unclassified(err.to_string()).with_source(err)
    }

    pub fn with_source<E>(mut self, err: E) -> Self
    where
        E: Into<BoxError>,
    {
        self.source = Some(err.into());
        self
    }

    /// Override the status of caller-defined failures. Ignored for every
    /// other kind, whose status is fixed by the taxonomy.
    pub fn with_status(mut self, new_status: StatusCode) -> Self {
        match &mut self.failure {
            Failure::DomainRuleViolation { status, .. }
            | Failure::ApplicationError { status, .. } => *status = new_status,
            _ => {}
        }
        self
    }

    /// Attach field errors to caller-defined or validation failures.
    pub fn with_errors(mut self, extra: ErrorMap) -> Self {
        match &mut self.failure {
            Failure::DomainRuleViolation { errors, .. }
            | Failure::ApplicationError { errors, .. }
            | Failure::ValidationFailed { errors } => {
                for (field, messages) in extra {
                    errors.entry(field).or_default().extend(messages);
                }
            }
            _ => {}
        }
        self
    }

    /// Record the current call site while the error propagates.
    #[track_caller]
    pub fn traced(mut self) -> Self {
        if self.trace.len() < MAX_TRACE_FRAMES {
            self.trace.push(Location::caller());
        }
        self
    }

    pub fn kind(&self) -> FailureKind {
        self.failure.kind()
    }

    pub fn failure(&self) -> &Failure {
        &self.failure
    }

    pub fn trace(&self) -> &[&'static Location<'static>] {
        &self.trace
    }
}

/// Slot used to hand the original error from `IntoResponse` to the
/// envelope middleware, which re-renders it with the request's correlation
/// id and the diagnostics setting.
#[derive(Clone, Debug)]
pub struct RenderedFailure(pub Arc<ApiError>);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut res = translate(&self, None, false).into_response();
        res.extensions_mut().insert(RenderedFailure(Arc::new(self)));
        res
    }
}

impl From<KeyError> for ApiError {
    #[track_caller]
    fn from(e: KeyError) -> Self {
        ApiError::new(Failure::Key(e))
    }
}

impl From<VerifyError> for ApiError {
    #[track_caller]
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Key(key) => ApiError::new(Failure::Key(key)),
            VerifyError::Malformed { detail, source } => {
                let err = ApiError::new(Failure::MalformedToken { detail });
                match source {
                    Some(source) => err.with_source(source),
                    None => err,
                }
            }
            VerifyError::InvalidSignature { source } => {
                let err = ApiError::new(Failure::InvalidSignature);
                match source {
                    Some(source) => err.with_source(source),
                    None => err,
                }
            }
            VerifyError::Expired => ApiError::new(Failure::TokenExpired),
            VerifyError::NotYetValid => ApiError::new(Failure::TokenNotYetValid),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    #[track_caller]
    fn from(e: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        let failure = match &e {
            sqlx::Error::RowNotFound => Failure::ResourceNotFound {
                target: Missing::Resource(None),
            },
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation => Failure::DataConflict {
                    conflict: Conflict::Duplicate,
                },
                ErrorKind::ForeignKeyViolation => Failure::DataConflict {
                    conflict: Conflict::Referenced,
                },
                _ => Failure::StoreError {
                    code: db.code().map(|c| c.into_owned()),
                },
            },
            _ => Failure::StoreError { code: None },
        };

        ApiError::new(failure).with_source(e)
    }
}
