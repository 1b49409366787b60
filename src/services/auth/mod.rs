/*
 * Responsibility
 * - Bearer token 検証に必要なサービス群の公開窓口
 *   - key_loader: 鍵ファイルの解決と読み込み
 *   - key_cache: 鍵バイト列の read-through キャッシュ
 *   - verifier: 署名 / 構造 / 時刻 claim の検証
 */
pub mod factory;
pub mod key_cache;
pub mod key_loader;
pub mod verifier;

pub use factory::build_token_verifier;
pub use key_cache::CachedKeySource;
pub use key_loader::{
    FileKeyLoader, KeyBytes, KeyError, KeyLoaderConfig, KeyLocation, KeyRole, KeySource,
    resolve_key_path,
};
pub use verifier::{KeyMaterial, TokenVerifier, VerifiedClaims, VerifyError};
