/*!
 * Authenticated claims extractor
 *
 * Responsibility:
 * - Bearer gate が検証済みの claims (VerifiedClaims) を handler に提供する
 * - 型定義は services::auth::VerifiedClaims、HTTP / axum 依存は core に閉じ込める
 *
 * Public API:
 * - AuthClaims
 */

mod core;

pub use core::AuthClaims;
