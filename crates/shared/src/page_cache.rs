//! 公开页面缓存与重新验证
//!
//! 公开页面渲染后的 HTML 按请求路径缓存。后台数据变更时调用 [`revalidate`]
//! 使依赖该数据的页面失效，下一次访问时重新渲染。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheKey};
use crate::error::Result;

/// 页面缓存后端
#[async_trait]
pub trait PageCache: Send + Sync {
    /// 读取缓存的页面
    async fn get(&self, path: &str) -> Result<Option<String>>;

    /// 写入页面
    async fn put(&self, path: &str, html: &str, ttl: Duration) -> Result<()>;

    /// 使单个页面失效
    async fn invalidate(&self, path: &str) -> Result<()>;

    /// 使某路径及其所有子路径失效，返回清除的条目数
    ///
    /// 按路径段匹配：`/news` 覆盖 `/news` 与 `/news/a`，不覆盖 `/newsletter`。
    async fn invalidate_prefix(&self, prefix: &str) -> Result<u64>;
}

/// 基于 Redis 的页面缓存，适合多实例部署
pub struct RedisPageCache {
    cache: Arc<Cache>,
}

impl RedisPageCache {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl PageCache for RedisPageCache {
    async fn get(&self, path: &str) -> Result<Option<String>> {
        self.cache.get(&CacheKey::page(path)).await
    }

    async fn put(&self, path: &str, html: &str, ttl: Duration) -> Result<()> {
        self.cache.set(&CacheKey::page(path), html, ttl).await
    }

    async fn invalidate(&self, path: &str) -> Result<()> {
        self.cache.delete(&CacheKey::page(path)).await.map(|_| ())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<u64> {
        let prefix = prefix.trim_end_matches('/');
        let exact = self.cache.delete(&CacheKey::page(prefix)).await?;
        let children = self
            .cache
            .delete_matching(&CacheKey::page_children_pattern(prefix))
            .await?;
        Ok(exact + children)
    }
}

/// 进程内页面缓存
#[derive(Default)]
pub struct MemoryPageCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryPageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PageCache for MemoryPageCache {
    async fn get(&self, path: &str) -> Result<Option<String>> {
        let hit = self.entries.get(path).and_then(|entry| {
            let (html, expires_at) = entry.value();
            (Instant::now() < *expires_at).then(|| html.clone())
        });
        if hit.is_none() {
            // 过期条目在读取时顺带清理
            self.entries
                .remove_if(path, |_, (_, expires_at)| Instant::now() >= *expires_at);
        }
        Ok(hit)
    }

    async fn put(&self, path: &str, html: &str, ttl: Duration) -> Result<()> {
        self.entries
            .insert(path.to_string(), (html.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn invalidate(&self, path: &str) -> Result<()> {
        self.entries.remove(path);
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<u64> {
        let prefix = prefix.trim_end_matches('/');
        let mut cleared = 0u64;
        self.entries.retain(|key, _| {
            let covered = is_under(key, prefix);
            cleared += u64::from(covered);
            !covered
        });
        Ok(cleared)
    }
}

/// `key` 是否为 `prefix` 本身或其子路径
fn is_under(key: &str, prefix: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// 重新验证依赖页面
///
/// 每个路径自身失效；非根路径同时清除其子路径（如 `/news` 会清除 `/news/some-slug`）。
/// 失效失败只记录日志，不影响调用方的写操作结果。
pub async fn revalidate(cache: &dyn PageCache, paths: &[String]) {
    for path in paths {
        let outcome = if path == "/" {
            cache.invalidate(path).await.map(|_| 1)
        } else {
            cache.invalidate_prefix(path).await
        };

        match outcome {
            Ok(cleared) => {
                debug!(path = %path, cleared, "Page revalidated");
                crate::observability::metrics::record_revalidation(path);
            }
            Err(e) => warn!(path = %path, error = %e, "Page revalidation failed"),
        }
    }
}
