//! 站点中间件

pub mod auth;
pub mod security;

pub use auth::require_admin;
pub use security::security_headers;
