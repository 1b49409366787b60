/// Factory: build `TokenVerifier` from application `Config`.
use std::sync::Arc;

use crate::config::Config;
use crate::services::auth::{CachedKeySource, FileKeyLoader, KeyRole, KeySource, TokenVerifier};

/// Never fails: a missing or broken key is logged here and reported per
/// request, so the process can start before keys are provisioned.
pub fn build_token_verifier(config: &Config) -> Arc<TokenVerifier> {
    let loader = FileKeyLoader::new(&config.keys);

    let keys: Arc<dyn KeySource> = if config.jwt_key_cache {
        Arc::new(CachedKeySource::new(loader))
    } else {
        Arc::new(loader)
    };

    match keys.load_public_key() {
        Ok(_) => tracing::info!(
            algorithm = ?keys.algorithm(),
            public_key = %keys.location(KeyRole::Public),
            "JWT public key loaded"
        ),
        Err(err) => tracing::warn!(
            error = %err,
            "JWT public key is not loadable; authenticated requests will fail until it is"
        ),
    }

    Arc::new(TokenVerifier::new(keys, config.jwt_leeway_seconds))
}
