pub mod auth_claims;
mod correlation;

pub use auth_claims::AuthClaims;
pub use correlation::CorrelationId;
