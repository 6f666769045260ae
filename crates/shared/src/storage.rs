//! 上传文件存储模块
//!
//! 图库、商品等后台表单上传的图片保存到本地目录，并返回可公开访问的 URL。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{KartError, Result};

/// 允许上传的图片扩展名
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "svg"];

/// 对象存储接口
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// 保存文件，返回公开 URL
    async fn put(&self, folder: &str, file_name: &str, bytes: &[u8]) -> Result<String>;

    /// 按公开 URL 删除文件，文件不存在时返回 false
    async fn delete(&self, url: &str) -> Result<bool>;
}

/// 本地目录存储
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: String,
    max_bytes: usize,
}

impl LocalStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: PathBuf::from(&config.upload_dir),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            max_bytes: config.max_upload_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 校验并规范化扩展名
    fn extension_of(file_name: &str) -> Result<String> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| KartError::UnsupportedFileType(file_name.to_string()))?;

        if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            Ok(ext)
        } else {
            Err(KartError::UnsupportedFileType(ext))
        }
    }

    /// 目录名只允许字母、数字、短横线和下划线
    fn sanitize_folder(folder: &str) -> String {
        let cleaned: String = folder
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if cleaned.is_empty() {
            "misc".to_string()
        } else {
            cleaned
        }
    }

    /// 把公开 URL 映射回本地路径，拒绝越出存储根目录的路径
    fn local_path_for(&self, url: &str) -> Option<PathBuf> {
        let relative = url.strip_prefix(&self.public_base_url)?.trim_start_matches('/');
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, folder: &str, file_name: &str, bytes: &[u8]) -> Result<String> {
        if bytes.len() > self.max_bytes {
            return Err(KartError::FileTooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }
        if bytes.is_empty() {
            return Err(KartError::Validation("上传文件为空".to_string()));
        }

        let ext = Self::extension_of(file_name)?;
        let folder = Self::sanitize_folder(folder);
        let stored_name = format!("{}.{}", Uuid::now_v7(), ext);

        let dir = self.root.join(&folder);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&stored_name), bytes).await?;

        let url = format!("{}/{}/{}", self.public_base_url, folder, stored_name);
        info!(url = %url, "File stored");
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<bool> {
        let Some(path) = self.local_path_for(url) else {
            return Ok(false);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(url = %url, "File deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage(max_bytes: usize) -> LocalStorage {
        let dir = std::env::temp_dir().join(format!("kart-storage-{}", Uuid::new_v4()));
        LocalStorage::new(&StorageConfig {
            upload_dir: dir.to_string_lossy().into_owned(),
            public_base_url: "/uploads/".to_string(),
            max_upload_bytes: max_bytes,
        })
    }

    #[tokio::test]
    async fn test_put_and_delete() {
        let storage = temp_storage(1024);
        let url = storage.put("gallery", "Podium.JPG", b"fake-jpeg").await.unwrap();

        assert!(url.starts_with("/uploads/gallery/"));
        assert!(url.ends_with(".jpg"));

        let path = storage.local_path_for(&url).unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"fake-jpeg");

        assert!(storage.delete(&url).await.unwrap());
        assert!(!storage.delete(&url).await.unwrap());
        let _ = tokio::fs::remove_dir_all(storage.root()).await;
    }

    #[tokio::test]
    async fn test_rejects_unsupported_extension() {
        let storage = temp_storage(1024);
        let err = storage.put("gallery", "script.sh", b"echo").await.unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_FILE_TYPE");
    }

    #[tokio::test]
    async fn test_rejects_oversized_file() {
        let storage = temp_storage(4);
        let err = storage.put("gallery", "a.png", b"too-large").await.unwrap_err();
        assert!(matches!(err, KartError::FileTooLarge { size: 9, limit: 4 }));
    }

    #[test]
    fn test_folder_sanitized() {
        assert_eq!(LocalStorage::sanitize_folder("../etc"), "etc");
        assert_eq!(LocalStorage::sanitize_folder("///"), "misc");
    }

    #[test]
    fn test_path_traversal_rejected() {
        let storage = temp_storage(16);
        assert!(storage.local_path_for("/uploads/../secret.png").is_none());
        assert!(storage.local_path_for("/elsewhere/a.png").is_none());
        assert!(storage.local_path_for("/uploads/gallery/a.png").is_some());
    }
}
