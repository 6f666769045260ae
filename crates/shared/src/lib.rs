//! 共享库
//!
//! 包含站点服务使用的配置、错误处理、数据库连接、缓存、页面缓存、文件存储等基础设施代码。

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod observability;
pub mod page_cache;
pub mod storage;
pub mod test_utils;
