//! 认证相关的 HTTP 处理器
//!
//! 登录页、登录与登出接口。登录接口同时接受 JSON 与表单提交：
//! JSON 调用返回 JSON，表单提交返回重定向或带错误信息的登录页。

use axum::{
    Form, Json,
    extract::{FromRequest, Query, Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde_json::json;
use tracing::{info, warn};

use crate::dto::{ApiResponse, LoginRequest, NextParams};
use crate::error::{PageError, SiteError};
use crate::flash::{self, FlashAction};
use crate::state::AppState;

/// 未指定或不安全时的登录后落地页
const DEFAULT_NEXT: &str = "/admin";

/// 只允许跳转到站内后台路径
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if (path == "/admin" || path.starts_with("/admin/"))
                && !path.contains("//")
                && !path.contains('\\') =>
        {
            path
        }
        _ => DEFAULT_NEXT,
    }
}

fn is_json(headers: &HeaderMap, header_name: header::HeaderName) -> bool {
    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

/// 登录请求体：按 Content-Type 解析 JSON 或表单
pub struct LoginPayload {
    pub request: LoginRequest,
    pub json: bool,
}

impl<S: Send + Sync> FromRequest<S> for LoginPayload {
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_json(req.headers(), header::CONTENT_TYPE) {
            // JSON 调用方拿到统一的错误响应体
            let Json(request) = Json::<LoginRequest>::from_request(req, state)
                .await
                .map_err(|e| SiteError::Validation(e.body_text()).into_response())?;
            Ok(Self {
                request,
                json: true,
            })
        } else {
            let Form(request) = Form::<LoginRequest>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self {
                request,
                json: false,
            })
        }
    }
}

fn render_login(
    state: &AppState,
    next: &str,
    error: Option<&str>,
) -> Result<Html<String>, PageError> {
    let chrome = state.templates.public_chrome("管理员登录");
    let html = state
        .templates
        .render_page("login", &chrome, &json!({ "next": next, "error": error }))?;
    Ok(Html(html))
}

/// 登录页
///
/// GET /login
pub async fn login_page(
    State(state): State<AppState>,
    Query(params): Query<NextParams>,
) -> Result<Html<String>, PageError> {
    let next = safe_next(params.next.as_deref());
    let error = params.error.as_ref().map(|_| "管理员 Token 无效");
    render_login(&state, next, error)
}

/// 管理员登录
///
/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: LoginPayload,
) -> Result<Response, PageError> {
    let LoginPayload { request, json } = payload;
    let next = safe_next(request.next.as_deref()).to_string();

    if !state.auth.verify(request.token.trim()) {
        warn!(json, "Admin login rejected");
        if json {
            return Ok(SiteError::InvalidToken.into_response());
        }
        let page = render_login(&state, &next, Some("管理员 Token 无效"))?;
        return Ok((StatusCode::UNAUTHORIZED, page).into_response());
    }

    info!("Admin logged in");
    let jar = jar.add(state.auth.login_cookie(request.token.trim()));

    if json {
        Ok((jar, Json(ApiResponse::<()>::success_empty())).into_response())
    } else {
        let jar = flash::set(jar, FlashAction::LoggedIn);
        Ok((jar, Redirect::to(&next)).into_response())
    }
}

/// 退出登录
///
/// POST /api/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap, jar: CookieJar) -> Response {
    let jar = jar.remove(state.auth.logout_cookie());
    info!("Admin logged out");

    if is_json(&headers, header::ACCEPT) || is_json(&headers, header::CONTENT_TYPE) {
        (jar, Json(ApiResponse::<()>::success_empty())).into_response()
    } else {
        (jar, Redirect::to("/")).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/admin/events")), "/admin/events");
        assert_eq!(safe_next(Some("/admin")), "/admin");
        assert_eq!(safe_next(Some("https://evil.example/admin")), DEFAULT_NEXT);
        assert_eq!(safe_next(Some("//evil.example")), DEFAULT_NEXT);
        assert_eq!(safe_next(Some("/administrator")), DEFAULT_NEXT);
        assert_eq!(safe_next(Some("/admin/..//x")), DEFAULT_NEXT);
        assert_eq!(safe_next(None), DEFAULT_NEXT);
    }
}
