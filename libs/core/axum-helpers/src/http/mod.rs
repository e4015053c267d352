//! HTTP middleware: CORS and security headers.
//!
//! ```ignore
//! use axum_helpers::http::{create_cors_layer, cors_origins_from_env, security_headers};
//!
//! let app = Router::new()
//!     .layer(axum::middleware::from_fn(security_headers))
//!     .layer(create_cors_layer(cors_origins_from_env()?));
//! ```

pub mod cors;
pub mod security;

pub use cors::{create_cors_layer, cors_origins_from_env, parse_origins};
pub use security::security_headers;
