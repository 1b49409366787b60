pub mod access;

pub use access::{BEARER_PREFIX, authenticate, extract_bearer};
