//! 赛道、赛事、车手与领奖台

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use validator::{Validate, ValidationError};

use super::{
    Column, EVENT_STATUSES, Field, FieldKind, Resource, datetime_input, empty_as_none,
    event_status, format_datetime_input, not_blank, parse_datetime_input, trimmed,
    trimmed_string, web_url,
};
use crate::error::{Result, SiteError};

/// 写入后按 id 重新读取（带关联字段）
async fn reload<R: Resource>(pool: &PgPool, id: i64) -> Result<R::Row> {
    R::get(pool, id).await?.ok_or(SiteError::RecordNotFound {
        resource: R::NAME,
        id,
    })
}

async fn delete_by_id(pool: &PgPool, sql: &str, id: i64) -> Result<bool> {
    let result = sqlx::query(sql).bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

// ==================== 赛道 ====================

pub struct Tracks;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TrackRow {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub length_meters: i32,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub map_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Validate)]
pub struct TrackForm {
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 100, message = "赛道名称长度必须在1-100个字符之间"),
        custom(function = "not_blank", message = "赛道名称长度必须在1-100个字符之间")
    )]
    pub name: String,
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 200, message = "地址长度必须在1-200个字符之间"),
        custom(function = "not_blank", message = "地址长度必须在1-200个字符之间")
    )]
    pub location: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(
        required(message = "请填写赛道长度"),
        range(min = 100, max = 10000, message = "赛道长度必须在100-10000米之间")
    )]
    pub length_meters: Option<i32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(custom(function = "web_url", message = "图片地址必须是有效的链接"))]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(custom(function = "web_url", message = "地图地址必须是有效的链接"))]
    pub map_url: Option<String>,
}

const TRACK_SELECT: &str = r#"
    SELECT id, name, location, length_meters, description, image_url, map_url, created_at, updated_at
    FROM tracks
"#;

#[async_trait]
impl Resource for Tracks {
    const SLUG: &'static str = "tracks";
    const NAME: &'static str = "赛道";

    type Row = TrackRow;
    type Form = TrackForm;

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("name", "名称"),
            Column::new("location", "地址"),
            Column::new("length_meters", "长度(米)"),
            Column::new("updated_at", "更新时间"),
        ];
        COLUMNS
    }

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::new("name", "名称", FieldKind::Text).required(),
            Field::new("location", "地址", FieldKind::Text).required(),
            Field::new("length_meters", "长度(米)", FieldKind::Number).required(),
            Field::new("description", "介绍", FieldKind::TextArea),
            Field::new("image_url", "图片", FieldKind::Url),
            Field::new("map_url", "地图链接", FieldKind::Url),
        ];
        FIELDS
    }

    fn row_id(row: &TrackRow) -> i64 {
        row.id
    }

    fn row_label(row: &TrackRow) -> String {
        row.name.clone()
    }

    fn form_from_row(row: &TrackRow) -> TrackForm {
        TrackForm {
            name: row.name.clone(),
            location: row.location.clone(),
            length_meters: Some(row.length_meters),
            description: row.description.clone(),
            image_url: row.image_url.clone(),
            map_url: row.map_url.clone(),
        }
    }

    fn revalidate_paths(_row: &TrackRow) -> Vec<String> {
        ["/", "/tracks", "/calendar", "/events"].map(String::from).to_vec()
    }

    async fn list(pool: &PgPool) -> Result<Vec<TrackRow>> {
        let rows = sqlx::query_as::<_, TrackRow>(&format!("{TRACK_SELECT} ORDER BY name"))
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    async fn get(pool: &PgPool, id: i64) -> Result<Option<TrackRow>> {
        let row = sqlx::query_as::<_, TrackRow>(&format!("{TRACK_SELECT} WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    async fn insert(pool: &PgPool, form: &TrackForm) -> Result<TrackRow> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tracks (name, location, length_meters, description, image_url, map_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(form.name.trim())
        .bind(form.location.trim())
        .bind(form.length_meters)
        .bind(trimmed(&form.description))
        .bind(trimmed(&form.image_url))
        .bind(trimmed(&form.map_url))
        .fetch_one(pool)
        .await?;
        reload::<Self>(pool, id).await
    }

    async fn update(pool: &PgPool, id: i64, form: &TrackForm) -> Result<Option<TrackRow>> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE tracks
            SET name = $2, location = $3, length_meters = $4, description = $5,
                image_url = $6, map_url = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(form.name.trim())
        .bind(form.location.trim())
        .bind(form.length_meters)
        .bind(trimmed(&form.description))
        .bind(trimmed(&form.image_url))
        .bind(trimmed(&form.map_url))
        .fetch_optional(pool)
        .await?;
        match updated {
            Some(id) => Ok(Some(reload::<Self>(pool, id).await?)),
            None => Ok(None),
        }
    }

    async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
        delete_by_id(pool, "DELETE FROM tracks WHERE id = $1", id).await
    }
}

// ==================== 赛事 ====================

pub struct Events;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EventRow {
    pub id: i64,
    pub title: String,
    pub track_id: i64,
    pub track_name: String,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub description: Option<String>,
    pub registration_url: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EventForm {
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 120, message = "赛事标题长度必须在1-120个字符之间"),
        custom(function = "not_blank", message = "赛事标题长度必须在1-120个字符之间")
    )]
    pub title: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(required(message = "请选择赛道"))]
    pub track_id: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub category_id: Option<i64>,
    #[serde(default)]
    #[validate(custom(function = "datetime_input", message = "请填写有效的开始时间"))]
    pub starts_at: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(custom(function = "web_url", message = "报名链接必须是有效的链接"))]
    pub registration_url: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "event_status", message = "赛事状态无效"))]
    pub status: String,
}

impl Default for EventForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            track_id: None,
            category_id: None,
            starts_at: String::new(),
            description: None,
            registration_url: None,
            status: "scheduled".to_string(),
        }
    }
}

impl EventForm {
    fn starts_at(&self) -> Result<DateTime<Utc>> {
        parse_datetime_input(&self.starts_at)
            .ok_or_else(|| SiteError::Validation("开始时间格式无效".to_string()))
    }
}

const EVENT_SELECT: &str = r#"
    SELECT e.id, e.title, e.track_id, t.name AS track_name, e.category_id, c.name AS category_name,
           e.starts_at, e.description, e.registration_url, e.status, e.created_at, e.updated_at
    FROM events e
    JOIN tracks t ON t.id = e.track_id
    LEFT JOIN categories c ON c.id = e.category_id
"#;

#[async_trait]
impl Resource for Events {
    const SLUG: &'static str = "events";
    const NAME: &'static str = "赛事";

    type Row = EventRow;
    type Form = EventForm;

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("title", "标题"),
            Column::new("track_name", "赛道"),
            Column::new("starts_at", "开始时间"),
            Column::new("status", "状态"),
        ];
        COLUMNS
    }

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::new("title", "标题", FieldKind::Text).required(),
            Field::new("track_id", "赛道", FieldKind::Reference("tracks")).required(),
            Field::new("category_id", "组别", FieldKind::Reference("categories")),
            Field::new("starts_at", "开始时间", FieldKind::DateTime)
                .required()
                .help("按 UTC 时间填写"),
            Field::new("description", "介绍", FieldKind::TextArea),
            Field::new("registration_url", "报名链接", FieldKind::Url),
            Field::new("status", "状态", FieldKind::Choice(EVENT_STATUSES)).required(),
        ];
        FIELDS
    }

    fn row_id(row: &EventRow) -> i64 {
        row.id
    }

    fn row_label(row: &EventRow) -> String {
        row.title.clone()
    }

    fn form_from_row(row: &EventRow) -> EventForm {
        EventForm {
            title: row.title.clone(),
            track_id: Some(row.track_id),
            category_id: row.category_id,
            starts_at: format_datetime_input(&row.starts_at),
            description: row.description.clone(),
            registration_url: row.registration_url.clone(),
            status: row.status.clone(),
        }
    }

    fn revalidate_paths(row: &EventRow) -> Vec<String> {
        vec![
            "/".to_string(),
            "/calendar".to_string(),
            "/events".to_string(),
            format!("/tracks/{}", row.track_id),
            "/gallery".to_string(),
        ]
    }

    async fn list(pool: &PgPool) -> Result<Vec<EventRow>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!("{EVENT_SELECT} ORDER BY e.starts_at DESC"))
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    async fn get(pool: &PgPool, id: i64) -> Result<Option<EventRow>> {
        let row = sqlx::query_as::<_, EventRow>(&format!("{EVENT_SELECT} WHERE e.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    async fn insert(pool: &PgPool, form: &EventForm) -> Result<EventRow> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO events (title, track_id, category_id, starts_at, description, registration_url, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(form.title.trim())
        .bind(form.track_id)
        .bind(form.category_id)
        .bind(form.starts_at()?)
        .bind(trimmed(&form.description))
        .bind(trimmed(&form.registration_url))
        .bind(&form.status)
        .fetch_one(pool)
        .await?;
        reload::<Self>(pool, id).await
    }

    async fn update(pool: &PgPool, id: i64, form: &EventForm) -> Result<Option<EventRow>> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE events
            SET title = $2, track_id = $3, category_id = $4, starts_at = $5, description = $6,
                registration_url = $7, status = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(form.title.trim())
        .bind(form.track_id)
        .bind(form.category_id)
        .bind(form.starts_at()?)
        .bind(trimmed(&form.description))
        .bind(trimmed(&form.registration_url))
        .bind(&form.status)
        .fetch_optional(pool)
        .await?;
        match updated {
            Some(id) => Ok(Some(reload::<Self>(pool, id).await?)),
            None => Ok(None),
        }
    }

    async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
        delete_by_id(pool, "DELETE FROM events WHERE id = $1", id).await
    }
}

// ==================== 车手 ====================

pub struct Pilots;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PilotRow {
    pub id: i64,
    pub name: String,
    pub number: i32,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub nationality: Option<String>,
    pub photo_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Validate)]
pub struct PilotForm {
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 100, message = "车手姓名长度必须在1-100个字符之间"),
        custom(function = "not_blank", message = "车手姓名长度必须在1-100个字符之间")
    )]
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(
        required(message = "请填写车号"),
        range(min = 0, max = 999, message = "车号必须在0-999之间")
    )]
    pub number: Option<i32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub category_id: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 60, message = "国籍不能超过60个字符"))]
    pub nationality: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(custom(function = "web_url", message = "照片地址必须是有效的链接"))]
    pub photo_url: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub bio: Option<String>,
}

const PILOT_SELECT: &str = r#"
    SELECT p.id, p.name, p.number, p.category_id, c.name AS category_name, p.nationality,
           p.photo_url, p.bio, p.created_at, p.updated_at
    FROM pilots p
    LEFT JOIN categories c ON c.id = p.category_id
"#;

#[async_trait]
impl Resource for Pilots {
    const SLUG: &'static str = "pilots";
    const NAME: &'static str = "车手";

    type Row = PilotRow;
    type Form = PilotForm;

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("number", "车号"),
            Column::new("name", "姓名"),
            Column::new("category_name", "组别"),
            Column::new("nationality", "国籍"),
        ];
        COLUMNS
    }

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::new("name", "姓名", FieldKind::Text).required(),
            Field::new("number", "车号", FieldKind::Number).required(),
            Field::new("category_id", "组别", FieldKind::Reference("categories")),
            Field::new("nationality", "国籍", FieldKind::Text),
            Field::new("photo_url", "照片", FieldKind::Url),
            Field::new("bio", "简介", FieldKind::TextArea),
        ];
        FIELDS
    }

    fn row_id(row: &PilotRow) -> i64 {
        row.id
    }

    fn row_label(row: &PilotRow) -> String {
        format!("#{} {}", row.number, row.name)
    }

    fn form_from_row(row: &PilotRow) -> PilotForm {
        PilotForm {
            name: row.name.clone(),
            number: Some(row.number),
            category_id: row.category_id,
            nationality: row.nationality.clone(),
            photo_url: row.photo_url.clone(),
            bio: row.bio.clone(),
        }
    }

    fn revalidate_paths(_row: &PilotRow) -> Vec<String> {
        ["/pilots", "/events"].map(String::from).to_vec()
    }

    async fn list(pool: &PgPool) -> Result<Vec<PilotRow>> {
        let rows = sqlx::query_as::<_, PilotRow>(&format!("{PILOT_SELECT} ORDER BY p.number"))
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    async fn get(pool: &PgPool, id: i64) -> Result<Option<PilotRow>> {
        let row = sqlx::query_as::<_, PilotRow>(&format!("{PILOT_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    async fn insert(pool: &PgPool, form: &PilotForm) -> Result<PilotRow> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO pilots (name, number, category_id, nationality, photo_url, bio)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(form.name.trim())
        .bind(form.number)
        .bind(form.category_id)
        .bind(trimmed(&form.nationality))
        .bind(trimmed(&form.photo_url))
        .bind(trimmed(&form.bio))
        .fetch_one(pool)
        .await?;
        reload::<Self>(pool, id).await
    }

    async fn update(pool: &PgPool, id: i64, form: &PilotForm) -> Result<Option<PilotRow>> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE pilots
            SET name = $2, number = $3, category_id = $4, nationality = $5, photo_url = $6,
                bio = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(form.name.trim())
        .bind(form.number)
        .bind(form.category_id)
        .bind(trimmed(&form.nationality))
        .bind(trimmed(&form.photo_url))
        .bind(trimmed(&form.bio))
        .fetch_optional(pool)
        .await?;
        match updated {
            Some(id) => Ok(Some(reload::<Self>(pool, id).await?)),
            None => Ok(None),
        }
    }

    async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
        delete_by_id(pool, "DELETE FROM pilots WHERE id = $1", id).await
    }
}

// ==================== 领奖台 ====================

pub struct Podiums;

/// 领奖台的一行成绩
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLine {
    pub position: i32,
    pub pilot_id: i64,
    pub points: i32,
    pub best_lap: Option<String>,
}

/// 解析成绩文本，每行 `名次,车手ID,积分,最快圈`，积分与最快圈可省略
pub fn parse_result_lines(text: &str) -> std::result::Result<Vec<ResultLine>, String> {
    let mut lines: Vec<ResultLine> = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let line_no = index + 1;
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(format!("第{}行格式应为 名次,车手ID,积分,最快圈", line_no));
        }

        let position: i32 = parts[0]
            .parse()
            .map_err(|_| format!("第{}行名次不是数字", line_no))?;
        if !(1..=20).contains(&position) {
            return Err(format!("第{}行名次必须在1-20之间", line_no));
        }
        let pilot_id: i64 = parts[1]
            .parse()
            .map_err(|_| format!("第{}行车手ID不是数字", line_no))?;
        let points: i32 = match parts.get(2).filter(|p| !p.is_empty()) {
            Some(p) => p.parse().map_err(|_| format!("第{}行积分不是数字", line_no))?,
            None => 0,
        };
        if !(0..=100).contains(&points) {
            return Err(format!("第{}行积分必须在0-100之间", line_no));
        }
        let best_lap = parts
            .get(3)
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string());
        if best_lap.as_ref().is_some_and(|lap| lap.chars().count() > 20) {
            return Err(format!("第{}行最快圈不能超过20个字符", line_no));
        }

        if lines.iter().any(|l| l.position == position) {
            return Err(format!("名次 {} 重复", position));
        }
        lines.push(ResultLine {
            position,
            pilot_id,
            points,
            best_lap,
        });
    }
    lines.sort_by_key(|l| l.position);
    Ok(lines)
}

fn podium_results(value: &str) -> std::result::Result<(), ValidationError> {
    parse_result_lines(value).map(|_| ()).map_err(|message| {
        ValidationError::new("results").with_message(message.into())
    })
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PodiumRow {
    pub id: i64,
    pub event_id: i64,
    pub event_title: String,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub notes: Option<String>,
    pub result_count: i64,
    pub results_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Validate)]
pub struct PodiumForm {
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(required(message = "请选择赛事"))]
    pub event_id: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub category_id: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub notes: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "podium_results"))]
    pub results: String,
}

const PODIUM_SELECT: &str = r#"
    SELECT p.id, p.event_id, e.title AS event_title, p.category_id, c.name AS category_name, p.notes,
           (SELECT COUNT(*) FROM podium_results r WHERE r.podium_id = p.id) AS result_count,
           COALESCE((
               SELECT string_agg(
                   r.position || ',' || r.pilot_id || ',' || r.points || ',' || COALESCE(r.best_lap, ''),
                   E'\n' ORDER BY r.position)
               FROM podium_results r WHERE r.podium_id = p.id
           ), '') AS results_text,
           p.created_at, p.updated_at
    FROM podiums p
    JOIN events e ON e.id = p.event_id
    LEFT JOIN categories c ON c.id = p.category_id
"#;

/// 替换领奖台的全部成绩
async fn replace_results(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    podium_id: i64,
    lines: &[ResultLine],
) -> Result<()> {
    sqlx::query("DELETE FROM podium_results WHERE podium_id = $1")
        .bind(podium_id)
        .execute(&mut **tx)
        .await?;

    for line in lines {
        sqlx::query(
            r#"
            INSERT INTO podium_results (podium_id, pilot_id, position, points, best_lap)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(podium_id)
        .bind(line.pilot_id)
        .bind(line.position)
        .bind(line.points)
        .bind(&line.best_lap)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

impl PodiumForm {
    fn lines(&self) -> Result<Vec<ResultLine>> {
        parse_result_lines(&self.results).map_err(SiteError::Validation)
    }
}

#[async_trait]
impl Resource for Podiums {
    const SLUG: &'static str = "podiums";
    const NAME: &'static str = "领奖台";

    type Row = PodiumRow;
    type Form = PodiumForm;

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("event_title", "赛事"),
            Column::new("category_name", "组别"),
            Column::new("result_count", "成绩数"),
            Column::new("updated_at", "更新时间"),
        ];
        COLUMNS
    }

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::new("event_id", "赛事", FieldKind::Reference("events")).required(),
            Field::new("category_id", "组别", FieldKind::Reference("categories")),
            Field::new("notes", "备注", FieldKind::TextArea),
            Field::new("results", "成绩", FieldKind::TextArea)
                .help("每行一条：名次,车手ID,积分,最快圈，例如 1,12,25,00:41.237"),
        ];
        FIELDS
    }

    fn row_id(row: &PodiumRow) -> i64 {
        row.id
    }

    fn row_label(row: &PodiumRow) -> String {
        row.event_title.clone()
    }

    fn form_from_row(row: &PodiumRow) -> PodiumForm {
        PodiumForm {
            event_id: Some(row.event_id),
            category_id: row.category_id,
            notes: row.notes.clone(),
            results: row.results_text.clone(),
        }
    }

    fn revalidate_paths(row: &PodiumRow) -> Vec<String> {
        vec!["/".to_string(), format!("/events/{}", row.event_id)]
    }

    async fn list(pool: &PgPool) -> Result<Vec<PodiumRow>> {
        let rows = sqlx::query_as::<_, PodiumRow>(&format!("{PODIUM_SELECT} ORDER BY e.starts_at DESC"))
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    async fn get(pool: &PgPool, id: i64) -> Result<Option<PodiumRow>> {
        let row = sqlx::query_as::<_, PodiumRow>(&format!("{PODIUM_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    async fn insert(pool: &PgPool, form: &PodiumForm) -> Result<PodiumRow> {
        let lines = form.lines()?;
        let mut tx = pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO podiums (event_id, category_id, notes)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(form.event_id)
        .bind(form.category_id)
        .bind(trimmed(&form.notes))
        .fetch_one(&mut *tx)
        .await?;
        replace_results(&mut tx, id, &lines).await?;
        tx.commit().await?;

        reload::<Self>(pool, id).await
    }

    async fn update(pool: &PgPool, id: i64, form: &PodiumForm) -> Result<Option<PodiumRow>> {
        let lines = form.lines()?;
        let mut tx = pool.begin().await?;

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE podiums
            SET event_id = $2, category_id = $3, notes = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(form.event_id)
        .bind(form.category_id)
        .bind(trimmed(&form.notes))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = updated else {
            return Ok(None);
        };
        replace_results(&mut tx, id, &lines).await?;
        tx.commit().await?;

        Ok(Some(reload::<Self>(pool, id).await?))
    }

    async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
        // 成绩随领奖台级联删除
        delete_by_id(pool, "DELETE FROM podiums WHERE id = $1", id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result_lines() {
        let lines = parse_result_lines("2,7,18\n\n1, 12, 25, 00:41.237\n").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            ResultLine {
                position: 1,
                pilot_id: 12,
                points: 25,
                best_lap: Some("00:41.237".to_string()),
            }
        );
        assert_eq!(lines[1].points, 18);
        assert_eq!(lines[1].best_lap, None);
    }

    #[test]
    fn test_parse_result_lines_rejects_bad_input() {
        assert!(parse_result_lines("1").is_err());
        assert!(parse_result_lines("0,3,10").is_err());
        assert!(parse_result_lines("21,3,10").is_err());
        assert!(parse_result_lines("1,3,101").is_err());
        assert!(parse_result_lines("1,abc").is_err());
        assert!(parse_result_lines("1,3\n1,4").is_err());
        assert!(parse_result_lines("").unwrap().is_empty());
    }

    #[test]
    fn test_track_form_validation() {
        let valid = TrackForm {
            name: "天马赛车场".to_string(),
            location: "上海".to_string(),
            length_meters: Some(1200),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        let missing_length = TrackForm {
            length_meters: None,
            ..valid.clone()
        };
        assert!(missing_length.validate().is_err());

        let too_short = TrackForm {
            length_meters: Some(50),
            ..valid.clone()
        };
        assert!(too_short.validate().is_err());

        let bad_url = TrackForm {
            map_url: Some("maps".to_string()),
            ..valid
        };
        assert!(bad_url.validate().is_err());
    }

    #[test]
    fn test_track_form_rejects_blank_text() {
        let blank = TrackForm {
            name: "   ".to_string(),
            location: "  ".to_string(),
            length_meters: Some(1200),
            ..Default::default()
        };
        let errors = super::super::field_errors(&blank.validate().unwrap_err());
        assert!(errors.contains_key("name"));
        assert!(errors.contains_key("location"));

        let submitted: TrackForm = serde_json::from_value(serde_json::json!({
            "name": "  天马赛车场 ",
            "location": "上海",
            "length_meters": "1200",
        }))
        .unwrap();
        assert_eq!(submitted.name, "天马赛车场");
        assert!(submitted.validate().is_ok());
    }

    #[test]
    fn test_event_form_validation() {
        let valid = EventForm {
            title: "春季公开赛".to_string(),
            track_id: Some(1),
            starts_at: "2025-04-12T09:00".to_string(),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());
        assert_eq!(valid.starts_at().unwrap().to_rfc3339(), "2025-04-12T09:00:00+00:00");

        let bad_status = EventForm {
            status: "postponed".to_string(),
            ..valid.clone()
        };
        assert!(bad_status.validate().is_err());

        let no_track = EventForm {
            track_id: None,
            ..valid.clone()
        };
        assert!(no_track.validate().is_err());

        let bad_time = EventForm {
            starts_at: "tomorrow".to_string(),
            ..valid
        };
        assert!(bad_time.validate().is_err());
    }

    #[test]
    fn test_podium_form_reports_line_error() {
        let form = PodiumForm {
            event_id: Some(1),
            results: "1,3,10\n1,4,8".to_string(),
            ..Default::default()
        };
        let errors = super::super::field_errors(&form.validate().unwrap_err());
        assert!(errors["results"].contains("重复"));
    }

    #[test]
    fn test_pilot_number_range() {
        let form = PilotForm {
            name: "王磊".to_string(),
            number: Some(1000),
            ..Default::default()
        };
        assert!(form.validate().is_err());
    }
}
