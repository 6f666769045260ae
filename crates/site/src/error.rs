//! 站点错误类型定义
//!
//! 后台和 API 的错误统一在这里映射为 HTTP 状态码与错误码

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kart_shared::error::KartError;
use serde_json::json;

/// PostgreSQL 外键约束冲突
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";
/// PostgreSQL 唯一约束冲突
const PG_UNIQUE_VIOLATION: &str = "23505";

/// 站点错误类型
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    // 认证错误
    #[error("未授权: {0}")]
    Unauthorized(String),
    #[error("管理员 Token 无效")]
    InvalidToken,
    #[error("禁止访问: {0}")]
    Forbidden(String),

    // 验证错误
    #[error("参数验证失败: {0}")]
    Validation(String),

    // 资源不存在
    #[error("{resource}不存在: {id}")]
    RecordNotFound { resource: &'static str, id: i64 },
    #[error("页面不存在: {0}")]
    NotFound(String),

    // 业务错误
    #[error("数据仍被其他记录引用，无法完成操作")]
    StillReferenced,
    #[error("记录已存在: {0}")]
    Duplicate(String),
    #[error("直播聊天已关闭")]
    ChatDisabled,
    #[error("上传失败: {0}")]
    Upload(String),

    // 系统错误
    #[error("数据库错误: {0}")]
    Database(sqlx::Error),
    #[error("模板渲染失败: {0}")]
    Template(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl SiteError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::ChatDisabled => StatusCode::FORBIDDEN,

            Self::Validation(_) | Self::Upload(_) => StatusCode::BAD_REQUEST,

            Self::RecordNotFound { .. } | Self::NotFound(_) => StatusCode::NOT_FOUND,

            Self::StillReferenced | Self::Duplicate(_) => StatusCode::CONFLICT,

            Self::Database(_) | Self::Template(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            Self::NotFound(_) => "NOT_FOUND",
            Self::StillReferenced => "STILL_REFERENCED",
            Self::Duplicate(_) => "DUPLICATE",
            Self::ChatDisabled => "CHAT_DISABLED",
            Self::Upload(_) => "UPLOAD_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Template(_) => "TEMPLATE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为系统级错误（详细信息只写日志，不返回给用户）
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Template(_) | Self::Internal(_)
        )
    }

    /// 面向用户的错误信息
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Template(e) => {
                tracing::error!(error = %e, "模板渲染失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for SiteError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.public_message();

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 约束冲突映射为业务错误，其余保持数据库错误
impl From<sqlx::Error> for SiteError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some(PG_FOREIGN_KEY_VIOLATION) => return Self::StillReferenced,
                Some(PG_UNIQUE_VIOLATION) => {
                    return Self::Duplicate(
                        db_err.constraint().unwrap_or("unique").to_string(),
                    );
                }
                _ => {}
            }
        }
        Self::Database(err)
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for SiteError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl From<handlebars::RenderError> for SiteError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Template(err.to_string())
    }
}

impl From<serde_json::Error> for SiteError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON 处理错误: {}", err))
    }
}

/// 从基础设施错误转换
impl From<KartError> for SiteError {
    fn from(err: KartError) -> Self {
        match err {
            KartError::Database(e) => Self::from(e),
            KartError::Validation(msg) => Self::Validation(msg),
            KartError::NotFound { entity, id } => Self::NotFound(format!("{} {}", entity, id)),
            e @ (KartError::UnsupportedFileType(_) | KartError::FileTooLarge { .. }) => {
                Self::Upload(e.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

/// 站点 Result 类型别名
pub type Result<T> = std::result::Result<T, SiteError>;

/// HTML 页面的错误包装
///
/// 与 [`SiteError`] 的区别只在响应格式：渲染为独立的错误页而不是 JSON。
#[derive(Debug)]
pub struct PageError(pub SiteError);

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let message = handlebars::html_escape(&self.0.public_message());
        let body = format!(
            "<!doctype html><html lang=\"zh\"><head><meta charset=\"utf-8\">\
             <title>{code}</title><link rel=\"stylesheet\" href=\"/static/site.css\"></head>\
             <body class=\"error-page\"><main><h1>{status}</h1><p>{message}</p>\
             <a href=\"/\">返回首页</a></main></body></html>",
            code = self.0.error_code(),
            status = status.as_u16(),
            message = message,
        );
        (status, axum::response::Html(body)).into_response()
    }
}

impl From<SiteError> for PageError {
    fn from(err: SiteError) -> Self {
        Self(err)
    }
}

impl From<sqlx::Error> for PageError {
    fn from(err: sqlx::Error) -> Self {
        Self(err.into())
    }
}

impl From<handlebars::RenderError> for PageError {
    fn from(err: handlebars::RenderError) -> Self {
        Self(err.into())
    }
}

impl From<KartError> for PageError {
    fn from(err: KartError) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(SiteError, StatusCode, &'static str)> {
        vec![
            (SiteError::Unauthorized("no cookie".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (SiteError::InvalidToken, StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            (SiteError::Forbidden("read only".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (SiteError::Validation("title".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (
                SiteError::RecordNotFound { resource: "赛道", id: 9 },
                StatusCode::NOT_FOUND,
                "RECORD_NOT_FOUND",
            ),
            (SiteError::NotFound("/news/x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (SiteError::StillReferenced, StatusCode::CONFLICT, "STILL_REFERENCED"),
            (SiteError::Duplicate("news_articles_slug_key".into()), StatusCode::CONFLICT, "DUPLICATE"),
            (SiteError::ChatDisabled, StatusCode::FORBIDDEN, "CHAT_DISABLED"),
            (SiteError::Upload("too large".into()), StatusCode::BAD_REQUEST, "UPLOAD_ERROR"),
            (SiteError::Template("missing".into()), StatusCode::INTERNAL_SERVER_ERROR, "TEMPLATE_ERROR"),
            (SiteError::Internal("oops".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ]
    }

    #[test]
    fn test_all_variants_status_and_code() {
        for (error, expected_status, expected_code) in all_error_variants() {
            assert_eq!(error.status_code(), expected_status, "状态码不匹配: {expected_code}");
            assert_eq!(error.error_code(), expected_code);
        }
    }

    #[test]
    fn test_record_not_found_message_has_context() {
        let err = SiteError::RecordNotFound { resource: "赛道", id: 42 };
        let msg = err.to_string();
        assert!(msg.contains("赛道"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = SiteError::Internal("connection string leaked".into());
        assert!(err.is_internal());
        assert!(!err.public_message().contains("leaked"));
    }

    #[test]
    fn test_pool_timeout_stays_database_error() {
        let err = SiteError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }

    #[test]
    fn test_kart_upload_errors_map_to_bad_request() {
        let err = SiteError::from(KartError::FileTooLarge { size: 10, limit: 5 });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_into_response_body_structure() {
        let response = SiteError::StillReferenced.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("读取响应体失败");
        let body: serde_json::Value =
            serde_json::from_slice(&body_bytes).expect("响应体不是合法 JSON");

        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "STILL_REFERENCED");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_page_error_renders_escaped_html() {
        let response = PageError(SiteError::NotFound("<script>".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert!(html.contains("404"));
        assert!(!html.contains("<script>"));
    }
}
