//! HTTP API 的数据传输对象

pub mod request;
pub mod response;

pub use request::{AnalyticsBatch, AnalyticsEvent, LoginRequest, NextParams};
pub use response::{AcceptedResponse, ApiResponse, UploadResponse};
