//! HTTP 请求处理器模块
//!
//! 公开页面、后台管理页面与 JSON 接口的处理器实现

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod health;
pub mod live;
pub mod public;
pub mod upload;
