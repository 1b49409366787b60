/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - Bearer が必要な handler ごとに gate を適用する (未定義 method は 405 のまま)
 */
use axum::{Router, routing::get};

use crate::middleware;
use crate::state::AppState;

use crate::api::v1::handlers::me::me;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new().route("/me", middleware::auth::access::protect(get(me), state))
}
