//! 路由配置模块
//!
//! 公开页面、后台管理页面与 JSON 接口的路由映射，以及全局中间件的组装

use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use kart_shared::config::AppConfig;
use kart_shared::observability::middleware as obs_middleware;
use tower_http::{compression::CompressionLayer, services::ServeDir, timeout::TimeoutLayer};

use crate::handlers::{admin, analytics, auth, health, live, public, upload};
use crate::middleware::{require_admin, security_headers};
use crate::resources::{
    Categories, Events, Gallery, Karts, Mechanics, News, Pilots, Podiums, Products, Resource,
    Sponsors, Tracks,
};
use crate::state::AppState;

/// 单个资源的后台路由
///
/// `/admin/{slug}` 下的列表、新建、编辑、删除确认
pub fn resource_routes<R: Resource>() -> Router<AppState> {
    let base = format!("/admin/{}", R::SLUG);
    Router::new()
        .route(&base, get(admin::list::<R>).post(admin::create::<R>))
        .route(&format!("{}/new", base), get(admin::new_form::<R>))
        .route(&format!("{}/{{id}}", base), post(admin::update::<R>))
        .route(&format!("{}/{{id}}/edit", base), get(admin::edit_form::<R>))
        .route(
            &format!("{}/{{id}}/delete", base),
            get(admin::confirm_delete::<R>).post(admin::delete::<R>),
        )
}

/// 后台路由（由 `require_admin` 统一拦截）
pub fn admin_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/admin", get(admin::dashboard))
        .merge(resource_routes::<Tracks>())
        .merge(resource_routes::<Categories>())
        .merge(resource_routes::<Events>())
        .merge(resource_routes::<Pilots>())
        .merge(resource_routes::<Podiums>())
        .merge(resource_routes::<Gallery>())
        .merge(resource_routes::<News>())
        .merge(resource_routes::<Products>())
        .merge(resource_routes::<Karts>())
        .merge(resource_routes::<Mechanics>())
        .merge(resource_routes::<Sponsors>())
        // 直播
        .route("/admin/live", get(live::settings_page).post(live::save_settings))
        .route("/admin/live-chat", get(live::chat_console))
        .route("/admin/live-chat/stream", get(live::chat_stream))
        .route("/admin/live-chat/{id}/delete", post(live::delete_chat_message))
        // 上传：multipart 开销另计，限制略放宽
        .route(
            "/admin/uploads",
            post(upload::upload).layer(DefaultBodyLimit::max(max_upload_bytes + 64 * 1024)),
        )
}

/// 公开页面路由
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(public::home))
        .route("/calendar", get(public::calendar))
        .route("/events/{id}", get(public::event))
        .route("/gallery", get(public::gallery))
        .route("/news", get(public::news_list))
        .route("/news/{slug}", get(public::news_article))
        .route("/tracks", get(public::tracks))
        .route("/tracks/{id}", get(public::track))
        .route("/products", get(public::products))
        .route("/sponsors", get(public::sponsors))
        .route("/pilots", get(public::pilots))
        .route("/karts", get(public::karts))
        .route("/mechanics", get(public::mechanics))
        .route("/live", get(public::live_page))
        .route("/login", get(auth::login_page))
        .route("/static/{name}", get(public::asset))
}

/// JSON 接口路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout))
        .route("/api/live/chat", get(live::list_chat).post(live::post_chat))
        .route("/api/analytics", post(analytics::collect))
}

/// 组装完整应用
///
/// 中间件从外到内：request_id → http_tracing → 超时 → 压缩 → 安全头 → 后台认证
pub fn app(state: AppState, config: &AppConfig) -> Router {
    let mut router = Router::new()
        .merge(public_routes())
        .merge(api_routes())
        .merge(admin_routes(config.storage.max_upload_bytes))
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .fallback(public::not_found);

    // 外部 CDN 地址时上传文件不由本服务提供
    let uploads = config.storage.public_base_url.trim_end_matches('/');
    if uploads.starts_with('/') && uploads.len() > 1 {
        router = router.nest_service(uploads, ServeDir::new(&config.storage.upload_dir));
    }

    router
        .layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .layer(middleware::from_fn(security_headers))
        .layer(CompressionLayer::new())
        .layer(request_timeout(Duration::from_secs(
            config.server.request_timeout_seconds,
        )))
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}

/// 超时的请求返回 408
fn request_timeout(limit: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_slow_request_times_out() {
        let app: Router = Router::new()
            .route("/slow", get(std::future::pending::<&'static str>))
            .layer(request_timeout(Duration::from_millis(50)));

        let response = app
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
