//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing, timeout)
//!     → middleware/resolve.rs (host lifecycle checkpoints)
//!     → request.rs (immutable request value, request ID, client IP)
//!     → normalize.rs (decoded URL for matching)
//!     → [pipeline resolves]
//!     → response.rs (directive → status + headers)
//!     → transport.rs (environment-specific writing)
//!     → Send to client
//! ```

pub mod middleware;
pub mod normalize;
pub mod request;
pub mod response;
pub mod server;
pub mod transport;

pub use request::{RedirectRequest, X_REQUEST_ID};
pub use server::RedirectServer;
