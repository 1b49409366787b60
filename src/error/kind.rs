/*
 * Responsibility
 * - 失敗の種類 (FailureKind) を閉じた enum として定義する
 * - kind → (status, default message) の対応表を 1 か所に固定する
 */
use std::fmt;

use axum::http::StatusCode;
use serde::Serialize;

/// Every distinguishable failure cause the service can report.
///
/// Adding a kind means adding a variant here and one `KindSpec` entry in
/// [`FailureKind::spec`]; the translator does not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    Unauthenticated,
    InvalidSignature,
    TokenExpired,
    TokenNotYetValid,
    MalformedToken,
    KeyUnavailable,
    KeyNotFound,
    KeyEmpty,
    AuthorizationDenied,
    ValidationFailed,
    ResourceNotFound,
    MethodNotAllowed,
    DataConflict,
    StoreError,
    DomainRuleViolation,
    ApplicationError,
    Unclassified,
}

/// Static description of a failure kind.
#[derive(Debug)]
pub struct KindSpec {
    pub name: &'static str,
    pub status: StatusCode,
    pub message: &'static str,
}

const UNAUTHENTICATED: KindSpec = KindSpec {
    name: "Unauthenticated",
    status: StatusCode::UNAUTHORIZED,
    message: "Authentication required.",
};

const INVALID_SIGNATURE: KindSpec = KindSpec {
    name: "InvalidSignature",
    status: StatusCode::UNAUTHORIZED,
    message: "Invalid token signature.",
};

const TOKEN_EXPIRED: KindSpec = KindSpec {
    name: "TokenExpired",
    status: StatusCode::UNAUTHORIZED,
    message: "Token has expired.",
};

const TOKEN_NOT_YET_VALID: KindSpec = KindSpec {
    name: "TokenNotYetValid",
    status: StatusCode::UNAUTHORIZED,
    message: "Token not yet valid.",
};

const MALFORMED_TOKEN: KindSpec = KindSpec {
    name: "MalformedToken",
    status: StatusCode::UNAUTHORIZED,
    message: "Malformed token.",
};

const KEY_UNAVAILABLE: KindSpec = KindSpec {
    name: "KeyUnavailable",
    status: StatusCode::INTERNAL_SERVER_ERROR,
    message: "JWT key is unavailable.",
};

const KEY_NOT_FOUND: KindSpec = KindSpec {
    name: "KeyNotFound",
    status: StatusCode::INTERNAL_SERVER_ERROR,
    message: "JWT key not found.",
};

const KEY_EMPTY: KindSpec = KindSpec {
    name: "KeyEmpty",
    status: StatusCode::INTERNAL_SERVER_ERROR,
    message: "JWT key is empty.",
};

const AUTHORIZATION_DENIED: KindSpec = KindSpec {
    name: "AuthorizationDenied",
    status: StatusCode::FORBIDDEN,
    message: "You do not have permission to perform this action.",
};

const VALIDATION_FAILED: KindSpec = KindSpec {
    name: "ValidationFailed",
    status: StatusCode::UNPROCESSABLE_ENTITY,
    message: "The provided data is invalid.",
};

const RESOURCE_NOT_FOUND: KindSpec = KindSpec {
    name: "ResourceNotFound",
    status: StatusCode::NOT_FOUND,
    message: "The requested resource was not found.",
};

const METHOD_NOT_ALLOWED: KindSpec = KindSpec {
    name: "MethodNotAllowed",
    status: StatusCode::METHOD_NOT_ALLOWED,
    message: "The method is not allowed for this endpoint.",
};

const DATA_CONFLICT: KindSpec = KindSpec {
    name: "DataConflict",
    status: StatusCode::CONFLICT,
    message: "A record with this information already exists.",
};

const STORE_ERROR: KindSpec = KindSpec {
    name: "StoreError",
    status: StatusCode::INTERNAL_SERVER_ERROR,
    message: "A database error occurred. Please try again later.",
};

const DOMAIN_RULE_VIOLATION: KindSpec = KindSpec {
    name: "DomainRuleViolation",
    status: StatusCode::UNPROCESSABLE_ENTITY,
    message: "The request violates a business rule.",
};

const APPLICATION_ERROR: KindSpec = KindSpec {
    name: "ApplicationError",
    status: StatusCode::BAD_REQUEST,
    message: "The request could not be processed.",
};

const UNCLASSIFIED: KindSpec = KindSpec {
    name: "Unclassified",
    status: StatusCode::INTERNAL_SERVER_ERROR,
    message: "An unexpected error occurred. Please try again later.",
};

impl FailureKind {
    pub const ALL: [FailureKind; 17] = [
        Self::Unauthenticated,
        Self::InvalidSignature,
        Self::TokenExpired,
        Self::TokenNotYetValid,
        Self::MalformedToken,
        Self::KeyUnavailable,
        Self::KeyNotFound,
        Self::KeyEmpty,
        Self::AuthorizationDenied,
        Self::ValidationFailed,
        Self::ResourceNotFound,
        Self::MethodNotAllowed,
        Self::DataConflict,
        Self::StoreError,
        Self::DomainRuleViolation,
        Self::ApplicationError,
        Self::Unclassified,
    ];

    pub const fn spec(self) -> &'static KindSpec {
        match self {
            Self::Unauthenticated => &UNAUTHENTICATED,
            Self::InvalidSignature => &INVALID_SIGNATURE,
            Self::TokenExpired => &TOKEN_EXPIRED,
            Self::TokenNotYetValid => &TOKEN_NOT_YET_VALID,
            Self::MalformedToken => &MALFORMED_TOKEN,
            Self::KeyUnavailable => &KEY_UNAVAILABLE,
            Self::KeyNotFound => &KEY_NOT_FOUND,
            Self::KeyEmpty => &KEY_EMPTY,
            Self::AuthorizationDenied => &AUTHORIZATION_DENIED,
            Self::ValidationFailed => &VALIDATION_FAILED,
            Self::ResourceNotFound => &RESOURCE_NOT_FOUND,
            Self::MethodNotAllowed => &METHOD_NOT_ALLOWED,
            Self::DataConflict => &DATA_CONFLICT,
            Self::StoreError => &STORE_ERROR,
            Self::DomainRuleViolation => &DOMAIN_RULE_VIOLATION,
            Self::ApplicationError => &APPLICATION_ERROR,
            Self::Unclassified => &UNCLASSIFIED,
        }
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn default_status(self) -> StatusCode {
        self.spec().status
    }

    /// Token-content failures: deterministic, never worth retrying.
    pub fn is_token_rejection(self) -> bool {
        matches!(
            self,
            Self::InvalidSignature
                | Self::TokenExpired
                | Self::TokenNotYetValid
                | Self::MalformedToken
        )
    }

    /// Key-material failures: operator misconfiguration, fatal to the request.
    pub fn is_key_failure(self) -> bool {
        matches!(
            self,
            Self::KeyUnavailable | Self::KeyNotFound | Self::KeyEmpty
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
