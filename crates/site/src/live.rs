//! 直播与聊天
//!
//! 聊天消息写入 `live_chat_messages` 表，数据库触发器通过 `NOTIFY live_chat_messages`
//! 推送整行 JSON。[`ChatFeed`] 订阅该通道并转发到进程内广播，后台控制台以 SSE 接收。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::error::Result;
use crate::resources::{empty_as_none, not_blank, trimmed_string, web_url};

/// 数据库通知通道名，与迁移中的触发器保持一致
pub const CHAT_CHANNEL: &str = "live_chat_messages";

/// 广播缓冲区大小，落后超过该数量的订阅者会丢弃旧消息
const CHAT_BUFFER: usize = 256;

/// 聊天消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// 发送聊天消息请求
#[derive(Debug, Deserialize, Validate)]
pub struct PostChatRequest {
    #[serde(deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 40, message = "昵称长度必须在1-40个字符之间"),
        custom(function = "not_blank", message = "昵称长度必须在1-40个字符之间")
    )]
    pub author: String,
    #[serde(deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 500, message = "消息长度必须在1-500个字符之间"),
        custom(function = "not_blank", message = "消息长度必须在1-500个字符之间")
    )]
    pub body: String,
}

/// 直播设置（单行表）
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LiveStreamSettings {
    pub title: String,
    pub embed_url: Option<String>,
    pub is_live: bool,
    pub chat_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

/// 直播设置表单
#[derive(Debug, Default, Clone, Serialize, Deserialize, Validate)]
pub struct LiveStreamForm {
    #[validate(length(max = 120, message = "标题不能超过120个字符"))]
    #[serde(default)]
    pub title: String,
    #[validate(custom(function = "web_url", message = "直播地址必须是有效的 URL"))]
    #[serde(default, deserialize_with = "empty_as_none")]
    pub embed_url: Option<String>,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub chat_enabled: bool,
}

impl From<&LiveStreamSettings> for LiveStreamForm {
    fn from(settings: &LiveStreamSettings) -> Self {
        Self {
            title: settings.title.clone(),
            embed_url: settings.embed_url.clone(),
            is_live: settings.is_live,
            chat_enabled: settings.chat_enabled,
        }
    }
}

/// 进程内聊天广播
///
/// 关闭后所有 SSE 订阅随之结束，优雅关闭才不会被长连接卡住。
#[derive(Clone)]
pub struct ChatHub {
    sender: broadcast::Sender<ChatMessage>,
    closed: Arc<watch::Sender<bool>>,
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHAT_BUFFER);
        let (closed, _) = watch::channel(false);
        Self {
            sender,
            closed: Arc::new(closed),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatMessage> {
        self.sender.subscribe()
    }

    /// 广播消息，返回当前接收者数量
    pub fn publish(&self, message: ChatMessage) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    /// 通知所有订阅流结束
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// 在 [`close`](Self::close) 之后完成；已关闭时立即完成
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static + use<> {
        let mut rx = self.closed.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }
}

/// 数据库变更订阅
pub struct ChatFeed;

impl ChatFeed {
    /// 启动监听任务，返回的句柄在关闭时 abort
    pub async fn spawn(pool: &PgPool, hub: ChatHub) -> Result<JoinHandle<()>> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(CHAT_CHANNEL).await?;
        info!(channel = CHAT_CHANNEL, "Live chat feed subscribed");

        Ok(tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        match serde_json::from_str::<ChatMessage>(notification.payload()) {
                            Ok(message) => {
                                let receivers = hub.publish(message);
                                debug!(receivers, "Chat message broadcast");
                            }
                            Err(e) => warn!(error = %e, "Malformed chat notification"),
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Live chat listener error");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        }))
    }
}

/// 最近的聊天消息（按时间正序）
pub async fn recent_messages(pool: &PgPool, limit: i64) -> Result<Vec<ChatMessage>> {
    let mut rows = sqlx::query_as::<_, ChatMessage>(
        r#"
        SELECT id, author, body, created_at
        FROM live_chat_messages
        ORDER BY created_at DESC, id DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.reverse();
    Ok(rows)
}

/// 写入聊天消息
pub async fn insert_message(pool: &PgPool, req: &PostChatRequest) -> Result<ChatMessage> {
    let row = sqlx::query_as::<_, ChatMessage>(
        r#"
        INSERT INTO live_chat_messages (author, body)
        VALUES ($1, $2)
        RETURNING id, author, body, created_at
        "#,
    )
    .bind(req.author.trim())
    .bind(req.body.trim())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// 删除聊天消息
pub async fn delete_message(pool: &PgPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM live_chat_messages WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// 读取直播设置
pub async fn load_settings(pool: &PgPool) -> Result<LiveStreamSettings> {
    let row = sqlx::query_as::<_, LiveStreamSettings>(
        r#"
        SELECT title, embed_url, is_live, chat_enabled, updated_at
        FROM live_stream_settings
        WHERE id = 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.unwrap_or_else(|| LiveStreamSettings {
        title: String::new(),
        embed_url: None,
        is_live: false,
        chat_enabled: false,
        updated_at: Utc::now(),
    }))
}

/// 保存直播设置（单行 upsert）
pub async fn save_settings(pool: &PgPool, form: &LiveStreamForm) -> Result<LiveStreamSettings> {
    let row = sqlx::query_as::<_, LiveStreamSettings>(
        r#"
        INSERT INTO live_stream_settings (id, title, embed_url, is_live, chat_enabled)
        VALUES (1, $1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE SET
            title = EXCLUDED.title,
            embed_url = EXCLUDED.embed_url,
            is_live = EXCLUDED.is_live,
            chat_enabled = EXCLUDED.chat_enabled,
            updated_at = NOW()
        RETURNING title, embed_url, is_live, chat_enabled, updated_at
        "#,
    )
    .bind(form.title.trim())
    .bind(&form.embed_url)
    .bind(form.is_live)
    .bind(form.chat_enabled)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: i64) -> ChatMessage {
        ChatMessage {
            id,
            author: "车迷".to_string(),
            body: "加油！".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_blank_chat_message_is_rejected() {
        let blank = PostChatRequest {
            author: "   ".to_string(),
            body: " ".to_string(),
        };
        let errors = blank.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("author"));
        assert!(errors.field_errors().contains_key("body"));

        let posted: PostChatRequest =
            serde_json::from_str(r#"{"author":" 车迷 ","body":"加油！\n"}"#).unwrap();
        assert_eq!(posted.author, "车迷");
        assert_eq!(posted.body, "加油！");
        assert!(posted.validate().is_ok());
    }

    #[tokio::test]
    async fn test_close_releases_waiters() {
        let hub = ChatHub::new();
        let waiter = tokio::spawn(hub.closed());

        hub.clone().close();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("关闭后等待者应立即返回")
            .unwrap();

        // 关闭之后新建的等待也立即完成
        tokio::time::timeout(std::time::Duration::from_secs(1), hub.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hub_delivers_to_subscribers() {
        let hub = ChatHub::new();
        let mut rx = hub.subscribe();

        assert_eq!(hub.publish(message(1)), 1);
        assert_eq!(rx.recv().await.unwrap().id, 1);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = ChatHub::new();
        assert_eq!(hub.publish(message(1)), 0);
    }

    #[test]
    fn test_notification_payload_parses() {
        // row_to_json 输出的时间戳格式
        let payload = r#"{"id":7,"author":"Ana","body":"hola","created_at":"2025-03-01T10:00:00.123456+00:00"}"#;
        let parsed: ChatMessage = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.id, 7);
        assert_eq!(parsed.author, "Ana");
    }

    #[test]
    fn test_post_chat_validation() {
        let ok = PostChatRequest {
            author: "Ana".to_string(),
            body: "¡Vamos!".to_string(),
        };
        assert!(ok.validate().is_ok());

        let empty = PostChatRequest {
            author: "Ana".to_string(),
            body: String::new(),
        };
        assert!(empty.validate().is_err());

        let long = PostChatRequest {
            author: "x".repeat(41),
            body: "hi".to_string(),
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_live_form_rejects_bad_url() {
        let form = LiveStreamForm {
            title: "决赛直播".to_string(),
            embed_url: Some("not a url".to_string()),
            is_live: true,
            chat_enabled: true,
        };
        assert!(form.validate().is_err());
    }
}
