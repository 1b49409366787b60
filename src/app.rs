/*
 * Responsibility
 * - Config読み込み → 依存生成 → Router 組み立て
 * - Middleware の適用 (correlation id / trace / envelope / Bearer gate)
 * - axum::serve() で起動
 */
use std::{net::SocketAddr, panic};

use anyhow::Result;
use axum::{Router, routing::get};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::api::v1::handlers::{health::health, version::version};
use crate::config::Config;
use crate::middleware;
use crate::services::auth::build_token_verifier;
use crate::state::{AppState, ServiceInfo};

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,bearer_gate=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook() {
    // Keep the default hook as a fallback (prints to stderr with location/payload).
    // Handler panics unwind into CatchPanicLayer and become envelopes.
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");
        default_hook(info);
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook();

    tracing::info!(
        "starting {} {} in {:?} mode on {}",
        config.service_name,
        config.service_version,
        config.app_env,
        config.addr
    );

    let state = build_state(&config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Build process-level services and inject them into the shared state.
pub fn build_state(config: &Config) -> AppState {
    let verifier = build_token_verifier(config);

    AppState::new(verifier, config.diagnostics, ServiceInfo::from_config(config))
}

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .nest("/api/v1", api::v1::routes(state.clone()))
        .fallback(api::not_found)
        .with_state(state.clone());

    middleware::http::apply(router, state)
}
