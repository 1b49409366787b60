/*
 * Responsibility
 * - middlware の公開インターフェース (re-export)
 * - auth (Bearer gate), envelope (エラー応答の整形), http (横断的 layer)
 */
pub mod auth;
pub mod envelope;
pub mod http;
