//! 卡丁车社区站点服务
//!
//! 服务端渲染的公开页面、基于管理员 Token 的后台内容管理、直播聊天与访问统计接口。
//!
//! ## 核心功能
//!
//! - **公开页面**：首页倒计时、赛历、赛事成绩、图库、新闻、赛道、商品、赞助商等，经页面缓存输出
//! - **后台管理**：各类内容的列表、新建、编辑、删除，保存后刷新依赖的公开页面
//! - **直播**：直播设置、公开聊天接口，后台通过 SSE 实时查看新消息
//! - **上传与统计**：图片上传、前端埋点事件收集
//!
//! ## 模块结构
//!
//! - `auth`: 管理员 Token 校验与登录 Cookie
//! - `resources`: 可管理内容的 [`resources::Resource`] 实现
//! - `handlers`: HTTP 请求处理器
//! - `routes`: 路由与中间件组装
//! - `templates`: Handlebars 模板注册与渲染
//! - `live`: 直播设置与聊天消息
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 模板：Handlebars
//! - 数据验证：validator
//! - 数据访问：sqlx (PostgreSQL)

pub mod auth;
pub mod dto;
pub mod error;
pub mod flash;
pub mod handlers;
pub mod live;
pub mod middleware;
pub mod resources;
pub mod routes;
pub mod state;
pub mod templates;

pub use error::{PageError, Result, SiteError};
pub use state::AppState;
