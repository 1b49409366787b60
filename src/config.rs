/*
 * Responsibility
 * - 環境変数や設定の読み込み (PORT, APP_ENV, JWT 鍵パス, アルゴリズムなど)
 * - 設定値のバリデーション (不正なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use jsonwebtoken::Algorithm;

use crate::services::auth::KeyLoaderConfig;
use crate::services::auth::key_loader::DEFAULT_ALGORITHM;
use crate::services::auth::verifier::DEFAULT_LEEWAY_SECONDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn parse(value: Option<&str>) -> Self {
        match value
            .unwrap_or("development")
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(&'static str),
    CurrentDir(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
            ConfigError::CurrentDir(e) => {
                write!(f, "cannot determine APP_ROOT from current directory: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::CurrentDir(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    /// Attach the `debug` block to error envelopes.
    pub diagnostics: bool,

    pub service_name: String,
    pub service_version: String,

    pub keys: KeyLoaderConfig,
    pub jwt_leeway_seconds: u64,
    pub jwt_key_cache: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port: u16 = match var("PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            None => 3000,
        };

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(var("APP_ENV").as_deref());

        let diagnostics = match var("APP_DEBUG") {
            Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid("APP_DEBUG"))?,
            None => !app_env.is_production(),
        };

        let app_root = match var("APP_ROOT") {
            Some(v) => PathBuf::from(v),
            None => std::env::current_dir().map_err(ConfigError::CurrentDir)?,
        };

        let storage_root = var("APP_STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| app_root.join("storage"));

        let algorithms = match var("JWT_ALGORITHMS") {
            Some(v) => parse_algorithms(&v)?,
            None => vec![DEFAULT_ALGORITHM],
        };

        let jwt_leeway_seconds = match var("JWT_LEEWAY_SECONDS") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid("JWT_LEEWAY_SECONDS"))?,
            None => DEFAULT_LEEWAY_SECONDS,
        };

        let jwt_key_cache = match var("JWT_KEY_CACHE") {
            Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid("JWT_KEY_CACHE"))?,
            None => false,
        };

        let keys = KeyLoaderConfig {
            public_key_path: var("JWT_PUBLIC_KEY_PATH"),
            private_key_path: var("JWT_PRIVATE_KEY_PATH"),
            algorithms,
            app_root,
            storage_root,
        };

        Ok(Self {
            addr,
            app_env,
            diagnostics,
            service_name: var("SERVICE_NAME").unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string()),
            service_version: var("SERVICE_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            keys,
            jwt_leeway_seconds,
            jwt_key_cache,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Comma-separated list, primary first. Symmetric algorithms are rejected.
fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let mut algorithms = Vec::new();

    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let alg = Algorithm::from_str(name).map_err(|_| ConfigError::Invalid("JWT_ALGORITHMS"))?;
        if matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::Invalid("JWT_ALGORITHMS"));
        }
        if !algorithms.contains(&alg) {
            algorithms.push(alg);
        }
    }

    if algorithms.is_empty() {
        algorithms.push(DEFAULT_ALGORITHM);
    }

    Ok(algorithms)
}
