//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;
use std::time::Duration;

use kart_shared::cache::Cache;
use kart_shared::page_cache::PageCache;
use kart_shared::storage::ObjectStorage;
use sqlx::PgPool;

use crate::auth::AdminAuth;
use crate::live::ChatHub;
use crate::templates::Templates;

/// Axum 应用共享状态
///
/// 所有字段都可廉价克隆，通过 Arc 在 handler 间共享
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL 连接池
    pub pool: PgPool,
    /// 公开页面缓存
    pub pages: Arc<dyn PageCache>,
    /// 上传文件存储
    pub storage: Arc<dyn ObjectStorage>,
    pub templates: Arc<Templates>,
    pub auth: Arc<AdminAuth>,
    /// 直播聊天广播
    pub chat: ChatHub,
    /// Redis 客户端（仅在使用 Redis 页面缓存时存在，用于就绪探针）
    pub cache: Option<Arc<Cache>>,
    pub page_ttl: Duration,
}

impl AppState {
    /// 重新验证依赖页面
    pub async fn revalidate(&self, paths: &[String]) {
        kart_shared::page_cache::revalidate(self.pages.as_ref(), paths).await;
    }
}
