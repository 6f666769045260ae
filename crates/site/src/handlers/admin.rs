//! 后台管理页面处理器
//!
//! 列表、新建、编辑、删除确认对所有 [`Resource`] 通用，由 `routes::resource_routes`
//! 按资源类型单态化注册。写操作成功后刷新依赖的公开页面缓存，设置提示并重定向回列表。

use axum::{
    Form,
    extract::{Path, State, rejection::FormRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use kart_shared::observability::metrics;
use serde::Serialize;
use tracing::{info, warn};
use validator::Validate;

use crate::error::{PageError, SiteError};
use crate::flash::{self, Flash, FlashAction};
use crate::live;
use crate::resources::{
    FieldErrors, FieldView, REGISTRY, Resource, RowView, SelectOptions, field_errors, field_views,
    row_views,
};
use crate::state::AppState;

/// 表单页的通用数据
#[derive(Debug, Serialize)]
pub struct FormView {
    pub title: String,
    pub action: String,
    pub cancel_url: String,
    pub is_new: bool,
    pub fields: Vec<FieldView>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListView {
    slug: &'static str,
    name: &'static str,
    columns: Vec<&'static str>,
    rows: Vec<RowView>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteView {
    name: &'static str,
    label: String,
    action: String,
    cancel_url: String,
}

#[derive(Debug, Serialize)]
struct DashboardCard {
    slug: &'static str,
    name: &'static str,
    count: Option<i64>,
}

fn list_path<R: Resource>() -> String {
    format!("/admin/{}", R::SLUG)
}

/// 渲染表单页
pub fn render_form_view(
    state: &AppState,
    flash: Option<Flash>,
    view: &FormView,
    status: StatusCode,
) -> Result<Response, PageError> {
    let chrome = state.templates.admin_chrome(view.title.clone(), flash);
    let html = state.templates.render_page("admin/form", &chrome, view)?;
    Ok((status, Html(html)).into_response())
}

async fn render_form<R: Resource>(
    state: &AppState,
    flash: Option<Flash>,
    id: Option<i64>,
    form: &R::Form,
    errors: &FieldErrors,
    error: Option<String>,
    status: StatusCode,
) -> Result<Response, PageError> {
    let options = match R::select_options(&state.pool).await {
        Ok(options) => options,
        Err(e) => {
            warn!(resource = R::SLUG, error = %e, "Failed to load select options");
            SelectOptions::new()
        }
    };

    let view = FormView {
        title: match id {
            None => format!("新建{}", R::NAME),
            Some(_) => format!("编辑{}", R::NAME),
        },
        action: match id {
            None => list_path::<R>(),
            Some(id) => format!("{}/{}", list_path::<R>(), id),
        },
        cancel_url: list_path::<R>(),
        is_new: id.is_none(),
        fields: field_views(R::fields(), form, errors, &options)?,
        error,
    };
    render_form_view(state, flash, &view, status)
}

/// 后台首页
///
/// GET /admin
pub async fn dashboard(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Html<String>), PageError> {
    let (jar, flash) = flash::take(jar);

    let mut cards = Vec::with_capacity(REGISTRY.len());
    for &(slug, name, table) in REGISTRY {
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&state.pool)
            .await
            .map_err(|e| warn!(table, error = %e, "Failed to count records"))
            .ok();
        cards.push(DashboardCard { slug, name, count });
    }

    let live = live::load_settings(&state.pool).await.ok();

    let chrome = state.templates.admin_chrome("管理后台", flash);
    let html = state.templates.render_page(
        "admin/dashboard",
        &chrome,
        &serde_json::json!({ "cards": cards, "live": live }),
    )?;
    Ok((jar, Html(html)))
}

/// 列表页
///
/// GET /admin/{slug}
pub async fn list<R: Resource>(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Html<String>), PageError> {
    let (jar, flash) = flash::take(jar);

    let (rows, error) = match R::list(&state.pool).await {
        Ok(rows) => (row_views::<R>(&rows)?, None),
        Err(e) => {
            warn!(resource = R::SLUG, "Admin list unavailable");
            (Vec::new(), Some(e.public_message()))
        }
    };

    let view = ListView {
        slug: R::SLUG,
        name: R::NAME,
        columns: R::columns().iter().map(|c| c.label).collect(),
        rows,
        error,
    };
    let chrome = state.templates.admin_chrome(R::NAME, flash);
    let html = state.templates.render_page("admin/list", &chrome, &view)?;
    Ok((jar, Html(html)))
}

/// 新建表单
///
/// GET /admin/{slug}/new
pub async fn new_form<R: Resource>(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Response), PageError> {
    let (jar, flash) = flash::take(jar);
    let form = R::Form::default();
    let page = render_form::<R>(&state, flash, None, &form, &FieldErrors::new(), None, StatusCode::OK)
        .await?;
    Ok((jar, page))
}

/// 编辑表单
///
/// GET /admin/{slug}/{id}/edit
pub async fn edit_form<R: Resource>(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<(CookieJar, Response), PageError> {
    let (jar, flash) = flash::take(jar);
    let row = R::get(&state.pool, id)
        .await?
        .ok_or(SiteError::RecordNotFound {
            resource: R::NAME,
            id,
        })?;
    let form = R::form_from_row(&row);
    let page = render_form::<R>(&state, flash, Some(id), &form, &FieldErrors::new(), None, StatusCode::OK)
        .await?;
    Ok((jar, page))
}

/// 新建提交
///
/// POST /admin/{slug}
pub async fn create<R: Resource>(
    State(state): State<AppState>,
    jar: CookieJar,
    form: Result<Form<R::Form>, FormRejection>,
) -> Result<Response, PageError> {
    let Form(form) = form.map_err(|e| SiteError::Validation(e.body_text()))?;
    save::<R>(&state, jar, None, form).await
}

/// 编辑提交
///
/// POST /admin/{slug}/{id}
pub async fn update<R: Resource>(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
    form: Result<Form<R::Form>, FormRejection>,
) -> Result<Response, PageError> {
    let Form(form) = form.map_err(|e| SiteError::Validation(e.body_text()))?;
    save::<R>(&state, jar, Some(id), form).await
}

/// 校验并保存，失败时带着用户输入重新渲染表单
async fn save<R: Resource>(
    state: &AppState,
    jar: CookieJar,
    id: Option<i64>,
    form: R::Form,
) -> Result<Response, PageError> {
    if let Err(errors) = form.validate() {
        let errors = field_errors(&errors);
        return render_form::<R>(
            state,
            None,
            id,
            &form,
            &errors,
            Some("请修正标记的字段后重新提交".to_string()),
            StatusCode::UNPROCESSABLE_ENTITY,
        )
        .await;
    }

    // 更新前的记录决定了哪些旧页面需要刷新
    let before = match id {
        Some(id) => R::get(&state.pool, id).await.ok().flatten(),
        None => None,
    };

    match R::save(&state.pool, id, &form).await {
        Ok(row) => {
            let mut paths = R::revalidate_paths(&row);
            if let Some(before) = &before {
                paths.extend(R::revalidate_paths(before));
            }
            paths.sort();
            paths.dedup();
            state.revalidate(&paths).await;

            let action = if id.is_some() { "update" } else { "create" };
            metrics::record_admin_mutation(R::SLUG, action);
            info!(resource = R::SLUG, id = R::row_id(&row), action, "Admin record saved");

            let jar = flash::set(jar, FlashAction::Saved);
            Ok((jar, Redirect::to(&list_path::<R>())).into_response())
        }
        Err(e @ SiteError::RecordNotFound { .. }) => Err(PageError(e)),
        Err(e) => {
            let (status, message, flash) = match &e {
                SiteError::Duplicate(_) => (StatusCode::CONFLICT, "已存在相同的记录".to_string(), None),
                SiteError::StillReferenced => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "关联的记录不存在".to_string(),
                    None,
                ),
                SiteError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone(), None),
                other => (
                    other.status_code(),
                    other.public_message(),
                    Some(Flash::from(FlashAction::Failed)),
                ),
            };
            warn!(resource = R::SLUG, code = e.error_code(), "Admin save failed");
            render_form::<R>(state, flash, id, &form, &FieldErrors::new(), Some(message), status).await
        }
    }
}

/// 删除确认页
///
/// GET /admin/{slug}/{id}/delete
pub async fn confirm_delete<R: Resource>(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<(CookieJar, Html<String>), PageError> {
    let (jar, flash) = flash::take(jar);
    let row = R::get(&state.pool, id)
        .await?
        .ok_or(SiteError::RecordNotFound {
            resource: R::NAME,
            id,
        })?;

    let view = DeleteView {
        name: R::NAME,
        label: R::row_label(&row),
        action: format!("{}/{}/delete", list_path::<R>(), id),
        cancel_url: list_path::<R>(),
    };
    let chrome = state.templates.admin_chrome(format!("删除{}", R::NAME), flash);
    let html = state.templates.render_page("admin/delete", &chrome, &view)?;
    Ok((jar, Html(html)))
}

/// 删除提交
///
/// POST /admin/{slug}/{id}/delete
pub async fn delete<R: Resource>(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response, PageError> {
    let row = R::get(&state.pool, id)
        .await?
        .ok_or(SiteError::RecordNotFound {
            resource: R::NAME,
            id,
        })?;

    let action = match R::delete(&state.pool, id).await {
        Ok(true) => {
            state.revalidate(&R::revalidate_paths(&row)).await;
            metrics::record_admin_mutation(R::SLUG, "delete");
            info!(resource = R::SLUG, id, "Admin record deleted");
            FlashAction::Deleted
        }
        Ok(false) => FlashAction::Failed,
        Err(SiteError::StillReferenced) => {
            warn!(resource = R::SLUG, id, "Delete blocked by references");
            FlashAction::Conflict
        }
        Err(e) => {
            warn!(resource = R::SLUG, id, message = %e.public_message(), "Admin delete failed");
            FlashAction::Failed
        }
    };

    let jar = flash::set(jar, action);
    Ok((jar, Redirect::to(&list_path::<R>())).into_response())
}
