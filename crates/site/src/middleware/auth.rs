//! 后台访问控制中间件
//!
//! `/admin` 及其子路径要求请求带有有效的管理员 Cookie，
//! 否则 303 重定向到登录页，并通过 `next` 参数记住原路径。

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use tracing::debug;

use crate::state::AppState;

/// 是否为受保护的后台路径
pub fn is_admin_path(path: &str) -> bool {
    path == "/admin" || path.starts_with("/admin/")
}

/// 登录页地址（带回跳参数）
pub fn login_redirect_target(path: &str) -> String {
    let encoded: String = path
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'/' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            other => format!("%{:02X}", other),
        })
        .collect();
    format!("/login?next={}", encoded)
}

/// 后台认证中间件
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if !is_admin_path(path) {
        return next.run(request).await;
    }

    let jar = CookieJar::from_headers(request.headers());
    if state.auth.is_authenticated(&jar) {
        return next.run(request).await;
    }

    debug!(path = %path, "Unauthenticated admin request");
    Redirect::to(&login_redirect_target(path)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_admin_path() {
        assert!(is_admin_path("/admin"));
        assert!(is_admin_path("/admin/events/3/edit"));
        assert!(!is_admin_path("/administrator"));
        assert!(!is_admin_path("/api/login"));
        assert!(!is_admin_path("/"));
    }

    #[test]
    fn test_login_redirect_target_encodes_path() {
        assert_eq!(login_redirect_target("/admin/events"), "/login?next=/admin/events");
        assert_eq!(
            login_redirect_target("/admin/news/a b"),
            "/login?next=/admin/news/a%20b"
        );
    }
}
