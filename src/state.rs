/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - verifier: TokenVerifier, diagnostics: debug block の有無, service: 名前/バージョン
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use crate::config::Config;
use crate::services::auth::TokenVerifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub environment: String,
}

impl ServiceInfo {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.service_name.clone(),
            version: config.service_version.clone(),
            environment: config.app_env.as_str().to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
    pub diagnostics: bool,
    pub service: Arc<ServiceInfo>,
}

impl AppState {
    pub fn new(verifier: Arc<TokenVerifier>, diagnostics: bool, service: ServiceInfo) -> Self {
        Self {
            verifier,
            diagnostics,
            service: Arc::new(service),
        }
    }
}
