//! 公开页面处理器
//!
//! 所有公开页面都经过页面缓存，键为请求路径。未命中时查询数据库并渲染，
//! 渲染结果写回缓存；查询失败时返回不缓存的降级页面。

use std::future::Future;

use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use chrono::{DateTime, Datelike, Utc};
use kart_shared::observability::metrics;
use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;

use crate::error::{PageError, Result, SiteError};
use crate::live::{self, LiveStreamSettings};
use crate::resources::catalog::{KartRow, MechanicRow, ProductRow, SponsorRow};
use crate::resources::content::{GalleryRow, NewsRow};
use crate::resources::racing::{EventRow, PilotRow, TrackRow};
use crate::resources::{
    Events, Gallery, Karts, Mechanics, Pilots, Products, Resource, SPONSOR_TIERS, Sponsors, Tracks,
};
use crate::state::AppState;

/// 页面标题与数据
pub struct Page<T> {
    pub title: String,
    pub data: T,
}

impl<T> Page<T> {
    pub fn new(title: impl Into<String>, data: T) -> Self {
        Self {
            title: title.into(),
            data,
        }
    }
}

/// 通过页面缓存响应，`load` 只在缓存未命中时执行
async fn cached_page<T, F>(
    state: &AppState,
    path: &str,
    template: &'static str,
    load: F,
) -> std::result::Result<Response, PageError>
where
    T: Serialize,
    F: Future<Output = Result<Page<T>>>,
{
    match state.pages.get(path).await {
        Ok(Some(html)) => {
            metrics::record_page_render(template, true);
            return Ok(Html(html).into_response());
        }
        Ok(None) => {}
        Err(e) => warn!(path, error = %e, "Page cache read failed"),
    }

    match load.await {
        Ok(page) => {
            let chrome = state.templates.public_chrome(page.title);
            let html = state.templates.render_page(template, &chrome, &page.data)?;
            if let Err(e) = state.pages.put(path, &html, state.page_ttl).await {
                warn!(path, error = %e, "Page cache write failed");
            }
            metrics::record_page_render(template, false);
            Ok(Html(html).into_response())
        }
        Err(e @ (SiteError::NotFound(_) | SiteError::RecordNotFound { .. })) => Err(PageError(e)),
        Err(e) => {
            warn!(path, code = e.error_code(), message = %e.public_message(), "Page data unavailable");
            let chrome = state.templates.public_chrome("暂时无法访问");
            let html = state
                .templates
                .render_page("unavailable", &chrome, &serde_json::json!({ "path": path }))?;
            Ok((StatusCode::SERVICE_UNAVAILABLE, Html(html)).into_response())
        }
    }
}

// ==================== 倒计时 ====================

/// 距离开赛的剩余时间
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    /// RFC 3339 时间，供前端脚本继续倒计时
    pub target: String,
}

pub fn countdown(now: DateTime<Utc>, target: DateTime<Utc>) -> Countdown {
    let remaining = (target - now).num_minutes().max(0);
    Countdown {
        days: remaining / (24 * 60),
        hours: remaining % (24 * 60) / 60,
        minutes: remaining % 60,
        target: target.to_rfc3339(),
    }
}

// ==================== 首页 ====================

#[derive(Debug, Serialize, sqlx::FromRow)]
struct UpcomingEvent {
    id: i64,
    title: String,
    starts_at: DateTime<Utc>,
    track_id: i64,
    track_name: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct NewsCard {
    title: String,
    slug: String,
    summary: String,
    cover_url: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct HomeData {
    next_event: Option<UpcomingEvent>,
    countdown: Option<Countdown>,
    news: Vec<NewsCard>,
    sponsors: Vec<SponsorRow>,
}

async fn load_home(pool: &PgPool) -> Result<Page<HomeData>> {
    let next_event = sqlx::query_as::<_, UpcomingEvent>(
        r#"
        SELECT e.id, e.title, e.starts_at, e.track_id, t.name AS track_name
        FROM events e
        JOIN tracks t ON t.id = e.track_id
        WHERE e.status = 'scheduled' AND e.starts_at > NOW()
        ORDER BY e.starts_at
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    let news = sqlx::query_as::<_, NewsCard>(
        r#"
        SELECT title, slug, summary, cover_url, published_at
        FROM news_articles
        WHERE published
        ORDER BY published_at DESC NULLS LAST
        LIMIT 3
        "#,
    )
    .fetch_all(pool)
    .await?;

    let sponsors = Sponsors::list(pool)
        .await?
        .into_iter()
        .filter(|s| s.tier == "gold")
        .collect();

    let countdown = next_event
        .as_ref()
        .map(|event| countdown(Utc::now(), event.starts_at));

    Ok(Page::new(
        "首页",
        HomeData {
            next_event,
            countdown,
            news,
            sponsors,
        },
    ))
}

/// GET /
pub async fn home(State(state): State<AppState>) -> std::result::Result<Response, PageError> {
    cached_page(&state, "/", "home", load_home(&state.pool)).await
}

// ==================== 赛历 ====================

#[derive(Debug, Serialize)]
struct CalendarEvent {
    #[serde(flatten)]
    event: EventRow,
    past: bool,
}

#[derive(Debug, Serialize)]
struct MonthGroup {
    label: String,
    events: Vec<CalendarEvent>,
}

/// 按开始时间所在月份分组（输入须已按时间排序）
fn group_by_month(events: Vec<EventRow>, now: DateTime<Utc>) -> Vec<MonthGroup> {
    let mut groups: Vec<MonthGroup> = Vec::new();
    for event in events {
        let label = format!("{}年{:02}月", event.starts_at.year(), event.starts_at.month());
        let past = event.starts_at < now;
        let entry = CalendarEvent { event, past };
        match groups.last_mut() {
            Some(group) if group.label == label => group.events.push(entry),
            _ => groups.push(MonthGroup {
                label,
                events: vec![entry],
            }),
        }
    }
    groups
}

async fn load_calendar(pool: &PgPool) -> Result<Page<Vec<MonthGroup>>> {
    let mut events = Events::list(pool).await?;
    events.sort_by_key(|e| e.starts_at);
    Ok(Page::new("赛历", group_by_month(events, Utc::now())))
}

/// GET /calendar
pub async fn calendar(State(state): State<AppState>) -> std::result::Result<Response, PageError> {
    cached_page(&state, "/calendar", "calendar", load_calendar(&state.pool)).await
}

// ==================== 赛事详情 ====================

#[derive(Debug, Serialize, sqlx::FromRow)]
struct PodiumEntry {
    position: i32,
    points: i32,
    best_lap: Option<String>,
    pilot_name: String,
    pilot_number: i32,
}

#[derive(Debug, Serialize)]
struct EventData {
    event: EventRow,
    track: Option<TrackRow>,
    countdown: Option<Countdown>,
    podium_notes: Option<String>,
    results: Vec<PodiumEntry>,
    gallery: Vec<GalleryRow>,
}

async fn load_event(pool: &PgPool, id: i64) -> Result<Page<EventData>> {
    let event = Events::get(pool, id)
        .await?
        .ok_or_else(|| SiteError::NotFound(format!("/events/{}", id)))?;
    let track = Tracks::get(pool, event.track_id).await?;

    let podium_notes: Option<Option<String>> =
        sqlx::query_scalar("SELECT notes FROM podiums WHERE event_id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    let results = sqlx::query_as::<_, PodiumEntry>(
        r#"
        SELECT r.position, r.points, r.best_lap, p.name AS pilot_name, p.number AS pilot_number
        FROM podium_results r
        JOIN podiums pd ON pd.id = r.podium_id
        JOIN pilots p ON p.id = r.pilot_id
        WHERE pd.event_id = $1
        ORDER BY r.position
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let gallery = Gallery::list(pool)
        .await?
        .into_iter()
        .filter(|g| g.event_id == Some(id))
        .collect();

    let now = Utc::now();
    let countdown = (event.status == "scheduled" && event.starts_at > now)
        .then(|| countdown(now, event.starts_at));

    Ok(Page::new(
        event.title.clone(),
        EventData {
            event,
            track,
            countdown,
            podium_notes: podium_notes.flatten(),
            results,
            gallery,
        },
    ))
}

/// GET /events/{id}
pub async fn event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> std::result::Result<Response, PageError> {
    let path = format!("/events/{}", id);
    cached_page(&state, &path, "event", load_event(&state.pool, id)).await
}

// ==================== 图库 ====================

async fn load_gallery(pool: &PgPool) -> Result<Page<Vec<GalleryRow>>> {
    Ok(Page::new("图库", Gallery::list(pool).await?))
}

/// GET /gallery
pub async fn gallery(State(state): State<AppState>) -> std::result::Result<Response, PageError> {
    cached_page(&state, "/gallery", "gallery", load_gallery(&state.pool)).await
}

// ==================== 新闻 ====================

const PUBLISHED_NEWS: &str = r#"
    SELECT id, title, slug, summary, body, cover_url, published, published_at, created_at, updated_at
    FROM news_articles
    WHERE published
"#;

async fn load_news_list(pool: &PgPool) -> Result<Page<Vec<NewsRow>>> {
    let rows = sqlx::query_as::<_, NewsRow>(&format!(
        "{PUBLISHED_NEWS} ORDER BY published_at DESC NULLS LAST"
    ))
    .fetch_all(pool)
    .await?;
    Ok(Page::new("新闻", rows))
}

async fn load_news_article(pool: &PgPool, slug: &str) -> Result<Page<NewsRow>> {
    let row = sqlx::query_as::<_, NewsRow>(&format!("{PUBLISHED_NEWS} AND slug = $1"))
        .bind(slug)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| SiteError::NotFound(format!("/news/{}", slug)))?;
    Ok(Page::new(row.title.clone(), row))
}

/// GET /news
pub async fn news_list(State(state): State<AppState>) -> std::result::Result<Response, PageError> {
    cached_page(&state, "/news", "news_list", load_news_list(&state.pool)).await
}

/// GET /news/{slug}
pub async fn news_article(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> std::result::Result<Response, PageError> {
    let path = format!("/news/{}", slug);
    cached_page(&state, &path, "news_article", load_news_article(&state.pool, &slug)).await
}

// ==================== 赛道 ====================

#[derive(Debug, Serialize)]
struct TrackData {
    track: TrackRow,
    events: Vec<EventRow>,
}

async fn load_tracks(pool: &PgPool) -> Result<Page<Vec<TrackRow>>> {
    Ok(Page::new("赛道", Tracks::list(pool).await?))
}

async fn load_track(pool: &PgPool, id: i64) -> Result<Page<TrackData>> {
    let track = Tracks::get(pool, id)
        .await?
        .ok_or_else(|| SiteError::NotFound(format!("/tracks/{}", id)))?;
    let mut events: Vec<EventRow> = Events::list(pool)
        .await?
        .into_iter()
        .filter(|e| e.track_id == id)
        .collect();
    events.sort_by_key(|e| e.starts_at);
    Ok(Page::new(track.name.clone(), TrackData { track, events }))
}

/// GET /tracks
pub async fn tracks(State(state): State<AppState>) -> std::result::Result<Response, PageError> {
    cached_page(&state, "/tracks", "tracks", load_tracks(&state.pool)).await
}

/// GET /tracks/{id}
pub async fn track(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> std::result::Result<Response, PageError> {
    let path = format!("/tracks/{}", id);
    cached_page(&state, &path, "track", load_track(&state.pool, id)).await
}

// ==================== 商品、车手、车辆、技师 ====================

async fn load_products(pool: &PgPool) -> Result<Page<Vec<ProductRow>>> {
    Ok(Page::new("周边商品", Products::list(pool).await?))
}

async fn load_pilots(pool: &PgPool) -> Result<Page<Vec<PilotRow>>> {
    Ok(Page::new("车手", Pilots::list(pool).await?))
}

async fn load_karts(pool: &PgPool) -> Result<Page<Vec<KartRow>>> {
    Ok(Page::new("车辆", Karts::list(pool).await?))
}

async fn load_mechanics(pool: &PgPool) -> Result<Page<Vec<MechanicRow>>> {
    Ok(Page::new("技师团队", Mechanics::list(pool).await?))
}

/// GET /products
pub async fn products(State(state): State<AppState>) -> std::result::Result<Response, PageError> {
    cached_page(&state, "/products", "products", load_products(&state.pool)).await
}

/// GET /pilots
pub async fn pilots(State(state): State<AppState>) -> std::result::Result<Response, PageError> {
    cached_page(&state, "/pilots", "pilots", load_pilots(&state.pool)).await
}

/// GET /karts
pub async fn karts(State(state): State<AppState>) -> std::result::Result<Response, PageError> {
    cached_page(&state, "/karts", "karts", load_karts(&state.pool)).await
}

/// GET /mechanics
pub async fn mechanics(State(state): State<AppState>) -> std::result::Result<Response, PageError> {
    cached_page(&state, "/mechanics", "mechanics", load_mechanics(&state.pool)).await
}

// ==================== 赞助商 ====================

#[derive(Debug, Serialize)]
struct TierGroup {
    tier: &'static str,
    label: &'static str,
    sponsors: Vec<SponsorRow>,
}

/// 按等级分组，空等级不输出
fn group_by_tier(sponsors: Vec<SponsorRow>) -> Vec<TierGroup> {
    let mut groups: Vec<TierGroup> = SPONSOR_TIERS
        .iter()
        .map(|&(tier, label)| TierGroup {
            tier,
            label,
            sponsors: Vec::new(),
        })
        .collect();
    for sponsor in sponsors {
        if let Some(group) = groups.iter_mut().find(|g| g.tier == sponsor.tier) {
            group.sponsors.push(sponsor);
        }
    }
    groups.retain(|g| !g.sponsors.is_empty());
    groups
}

async fn load_sponsors(pool: &PgPool) -> Result<Page<Vec<TierGroup>>> {
    Ok(Page::new("赞助商", group_by_tier(Sponsors::list(pool).await?)))
}

/// GET /sponsors
pub async fn sponsors(State(state): State<AppState>) -> std::result::Result<Response, PageError> {
    cached_page(&state, "/sponsors", "sponsors", load_sponsors(&state.pool)).await
}

// ==================== 直播 ====================

async fn load_live(pool: &PgPool) -> Result<Page<LiveStreamSettings>> {
    let settings = live::load_settings(pool).await?;
    let title = if settings.title.is_empty() {
        "直播".to_string()
    } else {
        settings.title.clone()
    };
    Ok(Page::new(title, settings))
}

/// GET /live
pub async fn live_page(State(state): State<AppState>) -> std::result::Result<Response, PageError> {
    cached_page(&state, "/live", "live", load_live(&state.pool)).await
}

// ==================== 静态资源 ====================

const ASSETS: &[(&str, &str, &str)] = &[
    ("site.css", "text/css; charset=utf-8", include_str!("../../static/site.css")),
    ("countdown.js", "text/javascript; charset=utf-8", include_str!("../../static/countdown.js")),
    ("live.js", "text/javascript; charset=utf-8", include_str!("../../static/live.js")),
    ("admin.js", "text/javascript; charset=utf-8", include_str!("../../static/admin.js")),
];

/// GET /static/{name}
pub async fn asset(Path(name): Path<String>) -> std::result::Result<Response, PageError> {
    let (_, content_type, body) = ASSETS
        .iter()
        .find(|(file, _, _)| *file == name)
        .ok_or_else(|| SiteError::NotFound(format!("/static/{}", name)))?;
    Ok((
        [
            (header::CONTENT_TYPE, *content_type),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        *body,
    )
        .into_response())
}

/// 未匹配任何路由
pub async fn not_found() -> PageError {
    PageError(SiteError::NotFound("页面不存在".to_string()))
}
