//! 直播设置与聊天处理器

use std::convert::Infallible;

use axum::{
    Form, Json,
    extract::{Path, State, rejection::FormRejection, rejection::JsonRejection},
    http::StatusCode,
    response::{
        Html, IntoResponse, Redirect, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use axum_extra::extract::CookieJar;
use futures::{Stream, StreamExt};
use kart_shared::observability::metrics;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use validator::Validate;

use crate::dto::ApiResponse;
use crate::error::{PageError, Result, SiteError};
use crate::flash::{self, FlashAction};
use crate::handlers::admin::{FormView, render_form_view};
use crate::live::{self, ChatMessage, LiveStreamForm, PostChatRequest};
use crate::resources::{Field, FieldErrors, FieldKind, SelectOptions, field_errors, field_views};
use crate::state::AppState;

/// 公开接口返回的最近消息条数
pub const CHAT_HISTORY_LIMIT: i64 = 50;

const LIVE_PATH: &str = "/live";

const LIVE_FIELDS: &[Field] = &[
    Field::new("title", "直播标题", FieldKind::Text),
    Field::new("embed_url", "播放器地址", FieldKind::Url).help("第三方直播平台提供的嵌入链接"),
    Field::new("is_live", "正在直播", FieldKind::Checkbox),
    Field::new("chat_enabled", "开放聊天", FieldKind::Checkbox),
];

fn settings_view(form: &LiveStreamForm, errors: &FieldErrors, error: Option<String>) -> Result<FormView> {
    Ok(FormView {
        title: "直播设置".to_string(),
        action: "/admin/live".to_string(),
        cancel_url: "/admin".to_string(),
        is_new: false,
        fields: field_views(LIVE_FIELDS, form, errors, &SelectOptions::new())?,
        error,
    })
}

/// 直播设置页
///
/// GET /admin/live
pub async fn settings_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> std::result::Result<(CookieJar, Response), PageError> {
    let (jar, flash) = flash::take(jar);
    let settings = live::load_settings(&state.pool).await?;
    let view = settings_view(&LiveStreamForm::from(&settings), &FieldErrors::new(), None)?;
    let page = render_form_view(&state, flash, &view, StatusCode::OK)?;
    Ok((jar, page))
}

/// 保存直播设置
///
/// POST /admin/live
pub async fn save_settings(
    State(state): State<AppState>,
    jar: CookieJar,
    form: std::result::Result<Form<LiveStreamForm>, FormRejection>,
) -> std::result::Result<Response, PageError> {
    let Form(form) = form.map_err(|e| SiteError::Validation(e.body_text()))?;

    if let Err(errors) = form.validate() {
        let view = settings_view(
            &form,
            &field_errors(&errors),
            Some("请修正标记的字段后重新提交".to_string()),
        )?;
        return render_form_view(&state, None, &view, StatusCode::UNPROCESSABLE_ENTITY);
    }

    let settings = live::save_settings(&state.pool, &form).await?;
    state.revalidate(&[LIVE_PATH.to_string()]).await;
    metrics::record_admin_mutation("live", "update");
    info!(is_live = settings.is_live, chat_enabled = settings.chat_enabled, "Live settings saved");

    let jar = flash::set(jar, FlashAction::Saved);
    Ok((jar, Redirect::to("/admin/live")).into_response())
}

/// 聊天管理台
///
/// GET /admin/live-chat
pub async fn chat_console(
    State(state): State<AppState>,
    jar: CookieJar,
) -> std::result::Result<(CookieJar, Html<String>), PageError> {
    let (jar, flash) = flash::take(jar);

    let (messages, error) = match live::recent_messages(&state.pool, CHAT_HISTORY_LIMIT).await {
        Ok(messages) => (messages, None),
        Err(e) => (Vec::new(), Some(e.public_message())),
    };

    let chrome = state.templates.admin_chrome("直播聊天", flash);
    let html = state.templates.render_page(
        "admin/live_chat",
        &chrome,
        &json!({ "messages": messages, "error": error }),
    )?;
    Ok((jar, Html(html)))
}

/// 新聊天消息的 SSE 推送
///
/// GET /admin/live-chat/stream
pub async fn chat_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.chat.subscribe())
        .filter_map(|item| async move {
            // 落后的订阅者直接跳过丢失的消息
            let message = item.ok()?;
            Event::default().event("message").json_data(&message).ok().map(Ok)
        })
        .take_until(state.chat.closed());
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// 删除聊天消息
///
/// POST /admin/live-chat/{id}/delete
pub async fn delete_chat_message(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Response {
    let action = match live::delete_message(&state.pool, id).await {
        Ok(true) => {
            state.revalidate(&[LIVE_PATH.to_string()]).await;
            info!(message_id = id, "Chat message deleted");
            FlashAction::Deleted
        }
        Ok(false) => FlashAction::Failed,
        Err(e) => {
            warn!(message_id = id, message = %e.public_message(), "Failed to delete chat message");
            FlashAction::Failed
        }
    };
    (flash::set(jar, action), Redirect::to("/admin/live-chat")).into_response()
}

/// 发送聊天消息
///
/// POST /api/live/chat
pub async fn post_chat(
    State(state): State<AppState>,
    body: std::result::Result<Json<PostChatRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<ChatMessage>>)> {
    let Json(req) = body.map_err(|e| SiteError::Validation(e.body_text()))?;
    req.validate()?;

    let settings = live::load_settings(&state.pool).await?;
    if !settings.chat_enabled {
        return Err(SiteError::ChatDisabled);
    }

    let message = live::insert_message(&state.pool, &req).await?;
    metrics::record_chat_message();
    info!(message_id = message.id, author = %message.author, "Chat message posted");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(message))))
}

/// 最近的聊天消息
///
/// GET /api/live/chat
pub async fn list_chat(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<ChatMessage>>>> {
    let messages = live::recent_messages(&state.pool, CHAT_HISTORY_LIMIT).await?;
    Ok(Json(ApiResponse::success(messages)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_view_marks_checkboxes() {
        let form = LiveStreamForm {
            title: "总决赛".to_string(),
            embed_url: None,
            is_live: true,
            chat_enabled: false,
        };
        let view = settings_view(&form, &FieldErrors::new(), None).unwrap();
        let is_live = view.fields.iter().find(|f| f.name == "is_live").unwrap();
        let chat = view.fields.iter().find(|f| f.name == "chat_enabled").unwrap();
        assert!(is_live.checked);
        assert!(!chat.checked);
        assert_eq!(view.action, "/admin/live");
    }
}
