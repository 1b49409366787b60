/*
 * Responsibility
 * - Bearer token (JWS compact) の検証
 *   Start → KeyLoaded → SignatureChecked → TimeClaimsChecked → Verified
 * - 失敗は最初に検出した段階の VerifyError で返す
 * - 公開鍵は KeySource から毎回取得する (キャッシュは KeySource 側の責務)
 */
use std::{fmt, str::FromStr, sync::Arc};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::key_loader::{KeyBytes, KeyError, KeyRole, KeySource};
use crate::error::BoxError;

/// Upper bound on accepted token length. Larger inputs are rejected before
/// any decoding work is done.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// Default tolerance, in seconds, applied to `exp` and `nbf`.
pub const DEFAULT_LEEWAY_SECONDS: u64 = 60;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Key(KeyError),

    #[error("malformed token: {detail}")]
    Malformed {
        detail: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("token signature does not match")]
    InvalidSignature {
        #[source]
        source: Option<BoxError>,
    },

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,
}

impl VerifyError {
    fn malformed(detail: impl Into<String>) -> Self {
        VerifyError::Malformed {
            detail: detail.into(),
            source: None,
        }
    }
}

impl From<KeyError> for VerifyError {
    fn from(e: KeyError) -> Self {
        VerifyError::Key(e)
    }
}

/// The verification input derived from configuration plus the loaded key.
#[derive(Clone)]
pub struct KeyMaterial {
    pub bytes: KeyBytes,
    pub algorithm: Algorithm,
    pub leeway_seconds: u64,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish_non_exhaustive()
    }
}

/// Claims of a token that passed every check.
#[derive(Clone, PartialEq, Serialize)]
pub struct VerifiedClaims {
    #[serde(rename = "sub")]
    pub subject: Option<String>,
    #[serde(rename = "iat")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(rename = "exp")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "nbf")]
    pub not_before: Option<DateTime<Utc>>,
    /// Every other claim, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for VerifiedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedClaims")
            .field("subject", &self.subject.as_ref().map(|_| "[REDACTED]"))
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("not_before", &self.not_before)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Verifies bearer tokens against the configured public key.
///
/// Holds no per-request state; one instance is shared by all requests.
pub struct TokenVerifier {
    keys: Arc<dyn KeySource>,
    leeway_seconds: u64,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithms", &self.keys.algorithms())
            .field("public_key", &self.keys.location(KeyRole::Public))
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

impl TokenVerifier {
    pub fn new(keys: Arc<dyn KeySource>, leeway_seconds: u64) -> Self {
        Self {
            keys,
            leeway_seconds,
        }
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedClaims, VerifyError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Same as [`TokenVerifier::verify`] with an explicit clock (unix seconds).
    pub fn verify_at(&self, token: &str, now: i64) -> Result<VerifiedClaims, VerifyError> {
        let (material, key) = self.load_material()?;

        let claims = check_signature(token, &material, &key, self.keys.algorithms())
            .map_err(|e| self.locate(e))?;

        let times = check_time_claims(&claims, now, material.leeway_seconds)?;

        let verified = VerifiedClaims::from_parts(claims, times)?;
        debug!(algorithm = ?material.algorithm, "access token verified");
        Ok(verified)
    }

    /// Fill in the key location for key errors raised during decoding.
    fn locate(&self, err: VerifyError) -> VerifyError {
        match err {
            VerifyError::Key(KeyError::Unusable {
                role,
                path,
                algorithm,
                reason,
            }) if path.is_empty() => VerifyError::Key(KeyError::Unusable {
                role,
                path: self.keys.location(role),
                algorithm: if algorithm.is_empty() {
                    format!("{:?}", self.keys.algorithm())
                } else {
                    algorithm
                },
                reason,
            }),
            other => other,
        }
    }

    fn load_material(&self) -> Result<(KeyMaterial, DecodingKey), VerifyError> {
        let material = KeyMaterial {
            bytes: self.keys.load_public_key()?,
            algorithm: self.keys.algorithm(),
            leeway_seconds: self.leeway_seconds,
        };

        let unusable = |reason: String| {
            VerifyError::Key(KeyError::Unusable {
                role: KeyRole::Public,
                path: self.keys.location(KeyRole::Public),
                algorithm: format!("{:?}", material.algorithm),
                reason,
            })
        };

        let key = match Family::of(material.algorithm) {
            Family::Rsa => DecodingKey::from_rsa_pem(&material.bytes),
            Family::Ec => DecodingKey::from_ec_pem(&material.bytes),
            Family::Ed => DecodingKey::from_ed_pem(&material.bytes),
            Family::Hmac => {
                return Err(unusable("symmetric algorithms are not supported".into()));
            }
        }
        .map_err(|e| unusable(e.to_string()))?;

        Ok((material, key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

impl Family {
    fn of(alg: Algorithm) -> Self {
        match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Family::Hmac,
            Algorithm::ES256 | Algorithm::ES384 => Family::Ec,
            Algorithm::EdDSA => Family::Ed,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Family::Rsa,
        }
    }
}

/// Structural checks done before handing the token to `jsonwebtoken`.
/// Returns the header algorithm.
fn inspect_structure(
    token: &str,
    allowed: &[Algorithm],
    key_algorithm: Algorithm,
) -> Result<Algorithm, VerifyError> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        return Err(VerifyError::malformed(format!(
            "token exceeds {MAX_TOKEN_SIZE_BYTES} bytes"
        )));
    }

    let parts: Vec<&str> = token.split('.').collect();
    let [header, payload, signature] = parts.as_slice() else {
        return Err(VerifyError::malformed(
            "expected three dot-separated segments",
        ));
    };

    if header.is_empty() || payload.is_empty() {
        return Err(VerifyError::malformed("empty header or payload segment"));
    }

    let header = decode_json_object(header, "header")?;

    let alg_name = header
        .get("alg")
        .and_then(Value::as_str)
        .ok_or_else(|| VerifyError::malformed("header has no 'alg'"))?;

    let alg = Algorithm::from_str(alg_name)
        .map_err(|_| VerifyError::malformed(format!("unsupported algorithm '{alg_name}'")))?;

    if !allowed.contains(&alg) {
        return Err(VerifyError::malformed(format!(
            "algorithm '{alg_name}' is not allowed"
        )));
    }

    if Family::of(alg) != Family::of(key_algorithm) {
        return Err(VerifyError::malformed(format!(
            "algorithm '{alg_name}' does not match the configured key"
        )));
    }

    decode_json_object(payload, "payload")?;

    if signature.is_empty() {
        return Err(VerifyError::InvalidSignature { source: None });
    }

    Ok(alg)
}

fn decode_json_object(segment: &str, what: &str) -> Result<Map<String, Value>, VerifyError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| VerifyError::Malformed {
            detail: format!("{what} is not valid base64url"),
            source: Some(Box::new(e)),
        })?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(VerifyError::malformed(format!(
            "{what} is not a JSON object"
        ))),
        Err(e) => Err(VerifyError::Malformed {
            detail: format!("{what} is not valid JSON"),
            source: Some(Box::new(e)),
        }),
    }
}

fn check_signature(
    token: &str,
    material: &KeyMaterial,
    key: &DecodingKey,
    allowed: &[Algorithm],
) -> Result<Map<String, Value>, VerifyError> {
    let header_alg = inspect_structure(token, allowed, material.algorithm)?;

    // Time claims are checked separately so they are only evaluated
    // once the signature is known to be good.
    let mut validation = Validation::new(header_alg);
    validation.algorithms = allowed
        .iter()
        .copied()
        .filter(|alg| Family::of(*alg) == Family::of(material.algorithm))
        .collect();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<Map<String, Value>>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(classify)
}

fn classify(e: jsonwebtoken::errors::Error) -> VerifyError {
    match e.kind() {
        ErrorKind::InvalidSignature | ErrorKind::Base64(_) => {
            VerifyError::InvalidSignature {
                source: Some(Box::new(e)),
            }
        }
        ErrorKind::ExpiredSignature => VerifyError::Expired,
        ErrorKind::ImmatureSignature => VerifyError::NotYetValid,
        ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidKeyFormat => VerifyError::Key(KeyError::Unusable {
            role: KeyRole::Public,
            path: String::new(),
            algorithm: String::new(),
            reason: e.to_string(),
        }),
        _ => VerifyError::Malformed {
            detail: "token could not be decoded".into(),
            source: Some(Box::new(e)),
        },
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TimeClaims {
    issued_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    not_before: Option<DateTime<Utc>>,
}

fn numeric_date(claims: &Map<String, Value>, name: &str) -> Result<Option<i64>, VerifyError> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                    .map(|f| f.floor() as i64)
            })
            .map(Some)
            .ok_or_else(|| VerifyError::malformed(format!("'{name}' is out of range"))),
        Some(_) => Err(VerifyError::malformed(format!(
            "'{name}' must be a numeric date"
        ))),
    }
}

/// Saturates at chrono's range; the raw value already passed the time checks.
fn to_datetime(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.map(|s| {
        DateTime::from_timestamp(s, 0).unwrap_or(if s > 0 {
            DateTime::<Utc>::MAX_UTC
        } else {
            DateTime::<Utc>::MIN_UTC
        })
    })
}

/// `exp` is checked before `nbf`. Both bounds are inclusive of the leeway.
fn check_time_claims(
    claims: &Map<String, Value>,
    now: i64,
    leeway_seconds: u64,
) -> Result<TimeClaims, VerifyError> {
    let leeway = i64::try_from(leeway_seconds).unwrap_or(i64::MAX);

    let exp = numeric_date(claims, "exp")?;
    let nbf = numeric_date(claims, "nbf")?;
    let iat = numeric_date(claims, "iat")?;

    if let Some(exp) = exp
        && now > exp.saturating_add(leeway)
    {
        return Err(VerifyError::Expired);
    }

    if let Some(nbf) = nbf
        && now < nbf.saturating_sub(leeway)
    {
        return Err(VerifyError::NotYetValid);
    }

    Ok(TimeClaims {
        issued_at: to_datetime(iat),
        expires_at: to_datetime(exp),
        not_before: to_datetime(nbf),
    })
}

impl VerifiedClaims {
    fn from_parts(mut claims: Map<String, Value>, times: TimeClaims) -> Result<Self, VerifyError> {
        let subject = match claims.remove("sub") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => return Err(VerifyError::malformed("'sub' must be a string")),
        };

        for name in ["iat", "exp", "nbf"] {
            claims.remove(name);
        }

        Ok(Self {
            subject,
            issued_at: times.issued_at,
            expires_at: times.expires_at,
            not_before: times.not_before,
            extra: claims,
        })
    }
}
