/*
 * Responsibility
 * - FileKeyLoader の read-through キャッシュ
 * - ファイルの (mtime, len) が変わったら読み直す (stale な鍵は返さない)
 * - ファイル以外の場所はキャッシュせずに委譲する
 */
use std::{fmt, fs, time::SystemTime};

use jsonwebtoken::Algorithm;
use moka::sync::Cache;
use tracing::debug;

use super::key_loader::{FileKeyLoader, KeyBytes, KeyError, KeyRole, KeySource};

/// One entry per role.
const CACHE_CAPACITY: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

#[derive(Debug, Clone)]
struct CachedKey {
    stamp: FileStamp,
    bytes: KeyBytes,
}

/// Caches key bytes per role, revalidating against file metadata on every
/// call. Entries are replaced whole, never mutated in place.
pub struct CachedKeySource {
    inner: FileKeyLoader,
    entries: Cache<KeyRole, CachedKey>,
}

impl CachedKeySource {
    pub fn new(inner: FileKeyLoader) -> Self {
        Self {
            inner,
            entries: Cache::builder().max_capacity(CACHE_CAPACITY).build(),
        }
    }

    fn load(&self, role: KeyRole) -> Result<KeyBytes, KeyError> {
        let Some(path) = self.inner.key_location(role).file_path() else {
            return self.inner.read(role);
        };

        let stamp = match fs::metadata(&path) {
            Ok(meta) => FileStamp {
                modified: meta.modified().ok(),
                len: meta.len(),
            },
            Err(_) => {
                self.entries.invalidate(&role);
                return self.inner.read(role);
            }
        };

        if let Some(hit) = self.entries.get(&role)
            && hit.stamp == stamp
        {
            return Ok(hit.bytes);
        }

        let bytes = match self.inner.read(role) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.entries.invalidate(&role);
                return Err(e);
            }
        };

        debug!(%role, "JWT key cache refreshed");
        self.entries.insert(
            role,
            CachedKey {
                stamp,
                bytes: bytes.clone(),
            },
        );

        Ok(bytes)
    }
}

impl fmt::Debug for CachedKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedKeySource")
            .field("inner", &self.inner)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl KeySource for CachedKeySource {
    fn load_public_key(&self) -> Result<KeyBytes, KeyError> {
        self.load(KeyRole::Public)
    }

    fn load_private_key(&self) -> Result<KeyBytes, KeyError> {
        self.load(KeyRole::Private)
    }

    fn algorithms(&self) -> &[Algorithm] {
        self.inner.algorithms()
    }

    fn location(&self, role: KeyRole) -> String {
        self.inner.location(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::KeyLoaderConfig;

    fn cached(dir: &std::path::Path) -> CachedKeySource {
        CachedKeySource::new(FileKeyLoader::new(&KeyLoaderConfig::new(dir)))
    }

    #[test]
    fn test_hit_returns_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("keys")).unwrap();
        std::fs::write(dir.path().join("keys/public.pem"), b"first").unwrap();
        let source = cached(dir.path());

        let a = source.load_public_key().unwrap();
        let b = source.load_public_key().unwrap();
        assert_eq!(&a[..], b"first");
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_changed_file_is_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("keys")).unwrap();
        let key = dir.path().join("keys/public.pem");
        std::fs::write(&key, b"first").unwrap();
        let source = cached(dir.path());

        assert_eq!(&source.load_public_key().unwrap()[..], b"first");

        // different length, so the stamp changes even on coarse mtime clocks
        std::fs::write(&key, b"second-key").unwrap();
        assert_eq!(&source.load_public_key().unwrap()[..], b"second-key");
    }

    #[test]
    fn test_removed_file_is_not_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("keys")).unwrap();
        let key = dir.path().join("keys/public.pem");
        std::fs::write(&key, b"first").unwrap();
        let source = cached(dir.path());

        source.load_public_key().unwrap();
        std::fs::remove_file(&key).unwrap();

        let err = source.load_public_key().unwrap_err();
        assert!(matches!(err, KeyError::NotFound { .. }));
    }

    #[test]
    fn test_failed_read_evicts_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("keys")).unwrap();
        let key = dir.path().join("keys/public.pem");
        std::fs::write(&key, b"first").unwrap();
        let source = cached(dir.path());

        source.load_public_key().unwrap();
        std::fs::write(&key, b"   ").unwrap();
        assert!(matches!(
            source.load_public_key().unwrap_err(),
            KeyError::Empty { .. }
        ));

        std::fs::write(&key, b"first").unwrap();
        assert_eq!(&source.load_public_key().unwrap()[..], b"first");
    }

    #[test]
    fn test_roles_are_cached_separately() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("keys")).unwrap();
        std::fs::write(dir.path().join("keys/public.pem"), b"pub").unwrap();
        std::fs::write(dir.path().join("keys/private.pem"), b"priv").unwrap();
        let source = cached(dir.path());

        assert_eq!(&source.load_public_key().unwrap()[..], b"pub");
        assert_eq!(&source.load_private_key().unwrap()[..], b"priv");
    }
}
