/*
 * Responsibility
 * - JWT 鍵ファイルの場所を解決する (URL / 絶対パス / storage/ / 相対パス)
 * - 鍵ファイルの読み込み (存在しない → NotFound, 空 → Empty)
 * - 検証側には KeySource trait だけを見せる (キャッシュ版と差し替え可能)
 */
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use jsonwebtoken::Algorithm;
use thiserror::Error;
use tracing::error;
use url::Url;

pub const DEFAULT_PUBLIC_KEY_PATH: &str = "keys/public.pem";
pub const DEFAULT_PRIVATE_KEY_PATH: &str = "keys/private.pem";
pub const DEFAULT_ALGORITHM: Algorithm = Algorithm::RS256;

/// Paths with this prefix live under the managed storage root.
pub const STORAGE_PREFIX: &str = "storage/";

pub type KeyBytes = Arc<[u8]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    Public,
    Private,
}

impl KeyRole {
    /// Environment variable an operator sets to point at this key.
    pub fn env_var(self) -> &'static str {
        match self {
            KeyRole::Public => "JWT_PUBLIC_KEY_PATH",
            KeyRole::Private => "JWT_PRIVATE_KEY_PATH",
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::Public => f.write_str("public"),
            KeyRole::Private => f.write_str("private"),
        }
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("JWT {role} key not found at {path}")]
    NotFound { role: KeyRole, path: String },

    #[error("JWT {role} key at {path} is empty")]
    Empty { role: KeyRole, path: String },

    #[error("JWT {role} key at {path} could not be read")]
    Unreadable {
        role: KeyRole,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("JWT {role} key at {path} is not a valid {algorithm} key: {reason}")]
    Unusable {
        role: KeyRole,
        path: String,
        algorithm: String,
        reason: String,
    },
}

impl KeyError {
    pub fn role(&self) -> KeyRole {
        match self {
            KeyError::NotFound { role, .. }
            | KeyError::Empty { role, .. }
            | KeyError::Unreadable { role, .. }
            | KeyError::Unusable { role, .. } => *role,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            KeyError::NotFound { path, .. }
            | KeyError::Empty { path, .. }
            | KeyError::Unreadable { path, .. }
            | KeyError::Unusable { path, .. } => path,
        }
    }
}

/// Capability the token verifier depends on.
///
/// Implementations must be safe to call concurrently; every call returns an
/// immutable snapshot of the key bytes.
pub trait KeySource: Send + Sync {
    fn load_public_key(&self) -> Result<KeyBytes, KeyError>;

    fn load_private_key(&self) -> Result<KeyBytes, KeyError>;

    /// Allow-listed algorithms, primary first. Never empty.
    fn algorithms(&self) -> &[Algorithm];

    /// Human-readable location of a key, used in operator messages.
    fn location(&self, role: KeyRole) -> String;

    fn algorithm(&self) -> Algorithm {
        self.algorithms()
            .first()
            .copied()
            .unwrap_or(DEFAULT_ALGORITHM)
    }
}

/// Where a configured key lives after path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLocation {
    Url(Url),
    File(PathBuf),
}

impl KeyLocation {
    /// Local filesystem path, if the location has one. Remote URLs have none:
    /// the loader never performs network I/O.
    pub fn file_path(&self) -> Option<PathBuf> {
        match self {
            KeyLocation::File(path) => Some(path.clone()),
            KeyLocation::Url(url) if url.scheme() == "file" => url.to_file_path().ok(),
            KeyLocation::Url(_) => None,
        }
    }
}

impl fmt::Display for KeyLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyLocation::Url(url) => write!(f, "{url}"),
            KeyLocation::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Resolve a configured key path. Pure: no filesystem or network access.
///
/// Order: absolute URL, absolute path (`/...`, `C:\...`, `C:/...`),
/// `storage/...` under `storage_root`, anything else under `app_root`.
pub fn resolve_key_path(raw: &str, app_root: &Path, storage_root: &Path) -> KeyLocation {
    if let Some(url) = parse_absolute_url(raw) {
        return KeyLocation::Url(url);
    }

    if is_absolute_path(raw) {
        return KeyLocation::File(PathBuf::from(raw));
    }

    if let Some(rest) = raw.strip_prefix(STORAGE_PREFIX) {
        return KeyLocation::File(storage_root.join(rest));
    }

    KeyLocation::File(app_root.join(raw))
}

fn parse_absolute_url(raw: &str) -> Option<Url> {
    // "C:/keys" parses as scheme "c"; require an authority (or file:) to count as a URL.
    let url = Url::parse(raw).ok()?;
    if url.scheme().len() > 1 && (url.has_host() || url.scheme() == "file") {
        Some(url)
    } else {
        None
    }
}

fn is_absolute_path(raw: &str) -> bool {
    if raw.starts_with('/') {
        return true;
    }

    matches!(
        raw.as_bytes(),
        [drive, b':', sep, ..] if drive.is_ascii_alphabetic() && (*sep == b'\\' || *sep == b'/')
    )
}

#[derive(Debug, Clone)]
pub struct KeyLoaderConfig {
    /// `None` or blank falls back to [`DEFAULT_PUBLIC_KEY_PATH`].
    pub public_key_path: Option<String>,
    /// `None` or blank falls back to [`DEFAULT_PRIVATE_KEY_PATH`].
    pub private_key_path: Option<String>,
    pub algorithms: Vec<Algorithm>,
    pub app_root: PathBuf,
    pub storage_root: PathBuf,
}

impl KeyLoaderConfig {
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        let app_root = app_root.into();
        let storage_root = app_root.join("storage");
        Self {
            public_key_path: None,
            private_key_path: None,
            algorithms: vec![DEFAULT_ALGORITHM],
            app_root,
            storage_root,
        }
    }
}

/// Loads PEM key files from disk on every call.
#[derive(Debug, Clone)]
pub struct FileKeyLoader {
    public: KeyLocation,
    private: KeyLocation,
    algorithms: Vec<Algorithm>,
}

impl FileKeyLoader {
    pub fn new(config: &KeyLoaderConfig) -> Self {
        let resolve = |configured: Option<&str>, default: &str| {
            let raw = configured
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(default);
            resolve_key_path(raw, &config.app_root, &config.storage_root)
        };

        let algorithms = if config.algorithms.is_empty() {
            vec![DEFAULT_ALGORITHM]
        } else {
            config.algorithms.clone()
        };

        Self {
            public: resolve(config.public_key_path.as_deref(), DEFAULT_PUBLIC_KEY_PATH),
            private: resolve(config.private_key_path.as_deref(), DEFAULT_PRIVATE_KEY_PATH),
            algorithms,
        }
    }

    pub fn key_location(&self, role: KeyRole) -> &KeyLocation {
        match role {
            KeyRole::Public => &self.public,
            KeyRole::Private => &self.private,
        }
    }

    pub fn read(&self, role: KeyRole) -> Result<KeyBytes, KeyError> {
        let location = self.key_location(role);
        let path = location.to_string();

        let Some(file) = location.file_path() else {
            error!(%role, %path, "JWT key location is not a local file");
            return Err(KeyError::NotFound { role, path });
        };

        let bytes = match fs::read(&file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                error!(%role, %path, "JWT key file not found");
                return Err(KeyError::NotFound { role, path });
            }
            Err(e) => {
                error!(%role, %path, error = %e, "failed to read JWT key file");
                return Err(KeyError::Unreadable {
                    role,
                    path,
                    source: e,
                });
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            error!(%role, %path, "JWT key file is empty");
            return Err(KeyError::Empty { role, path });
        }

        Ok(bytes.into())
    }
}

impl KeySource for FileKeyLoader {
    fn load_public_key(&self) -> Result<KeyBytes, KeyError> {
        self.read(KeyRole::Public)
    }

    fn load_private_key(&self) -> Result<KeyBytes, KeyError> {
        self.read(KeyRole::Private)
    }

    fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    fn location(&self, role: KeyRole) -> String {
        self.key_location(role).to_string()
    }
}
