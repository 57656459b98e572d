//! Access tokens, the per-method access gate and the login service.

/// Role-based gate applied to every call before dispatch.
pub mod interceptor;

/// Login RPC.
pub mod service;

/// Signed access tokens.
pub mod token;

pub use interceptor::{methods, AccessPolicy, AuthInterceptor, AuthLayer, ROLE_ADMIN, ROLE_USER};
pub use service::AuthServiceImpl;
pub use token::{generate_secret, Claims, TokenManager};
