//! Tower middleware placing the redirect pipeline in front of a host router.

pub mod resolve;

pub use resolve::{resolve_middleware, SharedResolver};
