//! Redis 缓存模块
//!
//! 页面缓存的 Redis 后端：HTML 以原始字符串保存，带过期时间；
//! 按前缀失效时用 SCAN 分批遍历，避免 KEYS 阻塞实例。

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::{debug, info, instrument};

use crate::config::RedisConfig;
use crate::error::{KartError, Result};

/// 每轮 SCAN 的建议数量
const SCAN_BATCH: usize = 200;

/// Redis 客户端
#[derive(Clone)]
pub struct Cache {
    client: Client,
}

impl Cache {
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!("Redis client created");
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(KartError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(KartError::from)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(key).await?)
    }

    /// 写入并设置过期时间（不足一秒按一秒计）
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    /// 返回实际删除的键数（0 或 1）
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.del(key).await?)
    }

    /// 删除匹配模式的所有键，返回删除数量
    #[instrument(skip(self))]
    pub async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut removed = 0u64;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let count: u64 = conn.del(&keys).await?;
                removed += count;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern, removed, "Redis keys removed");
        Ok(removed)
    }
}

/// 缓存键生成器
pub struct CacheKey;

impl CacheKey {
    pub fn page(path: &str) -> String {
        format!("page:{}", path)
    }

    /// 某路径下所有子路径的 SCAN 模式，路径中的通配符会被转义
    pub fn page_children_pattern(prefix: &str) -> String {
        let mut pattern = String::from("page:");
        for c in prefix.trim_end_matches('/').chars() {
            if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push_str("/*");
        pattern
    }
}
