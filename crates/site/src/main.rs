//! 卡丁车社区站点服务
//!
//! 启动顺序：配置 → 可观测性 → 数据库与迁移 → 页面缓存 → 聊天监听 → HTTP 服务

use std::sync::Arc;
use std::time::Duration;

use kart_shared::{
    cache::Cache,
    config::{AppConfig, PageCacheBackend},
    database::Database,
    observability,
    page_cache::{MemoryPageCache, PageCache, RedisPageCache},
    storage::LocalStorage,
};
use kart_site::{
    auth::AdminAuth,
    live::{ChatFeed, ChatHub},
    routes,
    state::AppState,
    templates::Templates,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 本地开发时从 .env 读取 KART_ 前缀的环境变量
    let _ = dotenvy::dotenv();

    let config = AppConfig::load("kart-site")?;
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!(
        environment = %config.environment,
        "Starting kart-site on {}",
        config.server_addr()
    );

    let db = Database::connect(&config.database).await?;
    if config.database.run_migrations {
        db.run_migrations().await?;
    }

    // Redis 只用于页面缓存，内存后端时不建立连接
    let (pages, cache): (Arc<dyn PageCache>, Option<Arc<Cache>>) =
        match config.site.page_cache_backend {
            PageCacheBackend::Redis => {
                let cache = Arc::new(Cache::new(&config.redis)?);
                if let Err(e) = cache.health_check().await {
                    warn!(error = %e, "Redis unavailable at startup, page cache will miss until it recovers");
                }
                (Arc::new(RedisPageCache::new(cache.clone())), Some(cache))
            }
            PageCacheBackend::Memory => (Arc::new(MemoryPageCache::new()), None),
        };
    info!(backend = ?config.site.page_cache_backend, "Page cache initialized");

    let templates = Templates::new(config.site.title.clone())?;
    let chat = ChatHub::new();

    let state = AppState {
        pool: db.pool().clone(),
        pages,
        storage: Arc::new(LocalStorage::new(&config.storage)),
        templates: Arc::new(templates),
        auth: Arc::new(AdminAuth::new(&config.auth)),
        chat: chat.clone(),
        cache,
        page_ttl: Duration::from_secs(config.site.page_cache_ttl_seconds),
    };

    // 聊天消息通过 PostgreSQL NOTIFY 推送给后台 SSE 订阅者
    let chat_feed = ChatFeed::spawn(db.pool(), chat.clone()).await?;

    let app = routes::app(state, &config);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 优雅关闭：收到 SIGTERM 或 Ctrl+C 时停止接收新连接并等待已有请求处理完毕。
    // SSE 长连接不会自行结束，先关闭聊天广播让它们退出。
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            chat.close();
        })
        .await?;

    chat_feed.abort();
    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// 收到 Ctrl+C 或 SIGTERM 后返回，触发 axum 的优雅关闭流程。
/// 信号处理器注册失败时只记录日志，该信号源视为永不触发。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
