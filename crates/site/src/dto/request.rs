//! API 请求体

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::resources::{not_blank, trimmed_string};

/// 管理员登录
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub token: String,
    /// 登录成功后跳转的后台路径（表单提交时使用）
    #[serde(default)]
    pub next: Option<String>,
}

/// 登录页查询参数
#[derive(Debug, Default, Deserialize)]
pub struct NextParams {
    pub next: Option<String>,
    pub error: Option<String>,
}

/// 单条埋点事件
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AnalyticsEvent {
    #[serde(deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 64, message = "事件名称长度必须在1-64个字符之间"),
        custom(function = "not_blank", message = "事件名称长度必须在1-64个字符之间")
    )]
    pub name: String,
    #[validate(length(max = 512, message = "页面路径不能超过512个字符"))]
    pub path: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

/// 埋点批量上报
#[derive(Debug, Deserialize, Validate)]
pub struct AnalyticsBatch {
    #[validate(
        length(min = 1, max = 100, message = "每批事件数量必须在1-100之间"),
        nested
    )]
    pub events: Vec<AnalyticsEvent>,
}
