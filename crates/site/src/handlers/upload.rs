//! 后台图片上传

use axum::{
    Json,
    extract::{Multipart, State},
};
use tracing::info;

use crate::dto::UploadResponse;
use crate::error::{Result, SiteError};
use crate::state::AppState;

/// 未指定目录时的存放位置
const DEFAULT_FOLDER: &str = "misc";

/// 上传单个图片文件
///
/// POST /admin/uploads，multipart 字段：`file`（必填）、`folder`（可选）
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut folder = DEFAULT_FOLDER.to_string();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SiteError::Upload(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("folder") => {
                folder = field
                    .text()
                    .await
                    .map_err(|e| SiteError::Upload(e.body_text()))?;
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| SiteError::Upload(e.body_text()))?;
                file = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| SiteError::Upload("缺少文件字段 file".to_string()))?;
    if bytes.is_empty() {
        return Err(SiteError::Upload("文件内容为空".to_string()));
    }

    let url = state.storage.put(folder.trim(), &file_name, &bytes).await?;
    info!(url = %url, size = bytes.len(), "File uploaded");

    Ok(Json(UploadResponse { url }))
}
