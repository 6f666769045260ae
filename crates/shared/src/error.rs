//! 统一错误处理模块
//!
//! 数据库、Redis 与上传存储的错误，由站点层转换为 HTTP 响应。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum KartError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    // ==================== 缓存错误 ====================
    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    // ==================== 存储错误 ====================
    #[error("文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("不支持的文件类型: {0}")]
    UnsupportedFileType(String),

    #[error("文件过大: {size} 字节，上限 {limit} 字节")]
    FileTooLarge { size: usize, limit: usize },

    // ==================== 验证错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, KartError>;

impl KartError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Migration(_) => "MIGRATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::UnsupportedFileType(_) => "UNSUPPORTED_FILE_TYPE",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = KartError::NotFound {
            entity: "Track".to_string(),
            id: "12".to_string(),
        };
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(err.to_string().contains("Track"));
    }

    #[test]
    fn test_upload_errors_carry_limits() {
        let too_large = KartError::FileTooLarge {
            size: 20,
            limit: 10,
        };
        assert_eq!(too_large.code(), "FILE_TOO_LARGE");
        assert!(too_large.to_string().contains("上限 10"));
    }
}
