//! 组别、图库与新闻

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use validator::Validate;

use super::{
    Column, DATE_INPUT_FORMAT, Field, FieldKind, Resource, date_input, empty_as_none,
    gallery_urls, not_blank, parse_date_input, slugify, trimmed, trimmed_string, url_lines, web_url,
};
use crate::error::{Result, SiteError};

async fn delete_by_id(pool: &PgPool, sql: &str, id: i64) -> Result<bool> {
    let result = sqlx::query(sql).bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

// ==================== 组别 ====================

pub struct Categories;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Validate)]
pub struct CategoryForm {
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 60, message = "组别名称长度必须在1-60个字符之间"),
        custom(function = "not_blank", message = "组别名称长度必须在1-60个字符之间")
    )]
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub description: Option<String>,
}

#[async_trait]
impl Resource for Categories {
    const SLUG: &'static str = "categories";
    const NAME: &'static str = "组别";

    type Row = CategoryRow;
    type Form = CategoryForm;

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("name", "名称"),
            Column::new("description", "说明"),
            Column::new("updated_at", "更新时间"),
        ];
        COLUMNS
    }

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::new("name", "名称", FieldKind::Text).required(),
            Field::new("description", "说明", FieldKind::TextArea),
        ];
        FIELDS
    }

    fn row_id(row: &CategoryRow) -> i64 {
        row.id
    }

    fn row_label(row: &CategoryRow) -> String {
        row.name.clone()
    }

    fn form_from_row(row: &CategoryRow) -> CategoryForm {
        CategoryForm {
            name: row.name.clone(),
            description: row.description.clone(),
        }
    }

    fn revalidate_paths(_row: &CategoryRow) -> Vec<String> {
        ["/pilots", "/calendar", "/events"].map(String::from).to_vec()
    }

    async fn list(pool: &PgPool) -> Result<Vec<CategoryRow>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, description, created_at, updated_at FROM categories ORDER BY name",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    async fn get(pool: &PgPool, id: i64) -> Result<Option<CategoryRow>> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, description, created_at, updated_at FROM categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    async fn insert(pool: &PgPool, form: &CategoryForm) -> Result<CategoryRow> {
        let row = sqlx::query_as::<_, CategoryRow>(
            r#"
            INSERT INTO categories (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, created_at, updated_at
            "#,
        )
        .bind(form.name.trim())
        .bind(trimmed(&form.description))
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    async fn update(pool: &PgPool, id: i64, form: &CategoryForm) -> Result<Option<CategoryRow>> {
        let row = sqlx::query_as::<_, CategoryRow>(
            r#"
            UPDATE categories SET name = $2, description = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, description, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(form.name.trim())
        .bind(trimmed(&form.description))
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
        delete_by_id(pool, "DELETE FROM categories WHERE id = $1", id).await
    }
}

// ==================== 图库 ====================

pub struct Gallery;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct GalleryRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub image_urls: Vec<String>,
    pub event_id: Option<i64>,
    pub event_title: Option<String>,
    pub taken_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Validate)]
pub struct GalleryForm {
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 120, message = "标题长度必须在1-120个字符之间"),
        custom(function = "not_blank", message = "标题长度必须在1-120个字符之间")
    )]
    pub title: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub description: Option<String>,
    /// 每行一个图片链接
    #[serde(default)]
    #[validate(custom(function = "gallery_urls", message = "请填写1-30个有效的图片链接，每行一个"))]
    pub image_urls: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub event_id: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(custom(function = "date_input", message = "拍摄日期格式无效"))]
    pub taken_on: Option<String>,
}

impl GalleryForm {
    fn taken_on(&self) -> Option<NaiveDate> {
        self.taken_on.as_deref().and_then(parse_date_input)
    }
}

const GALLERY_SELECT: &str = r#"
    SELECT g.id, g.title, g.description, g.image_urls, g.event_id, e.title AS event_title,
           g.taken_on, g.created_at, g.updated_at
    FROM gallery_items g
    LEFT JOIN events e ON e.id = g.event_id
"#;

#[async_trait]
impl Resource for Gallery {
    const SLUG: &'static str = "gallery";
    const NAME: &'static str = "图库";

    type Row = GalleryRow;
    type Form = GalleryForm;

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("title", "标题"),
            Column::new("image_urls", "图片"),
            Column::new("event_title", "赛事"),
            Column::new("taken_on", "拍摄日期"),
        ];
        COLUMNS
    }

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::new("title", "标题", FieldKind::Text).required(),
            Field::new("description", "说明", FieldKind::TextArea),
            Field::new("image_urls", "图片链接", FieldKind::UrlList)
                .required()
                .help("每行一个链接，最多30张"),
            Field::new("event_id", "关联赛事", FieldKind::Reference("events")),
            Field::new("taken_on", "拍摄日期", FieldKind::Date),
        ];
        FIELDS
    }

    fn row_id(row: &GalleryRow) -> i64 {
        row.id
    }

    fn row_label(row: &GalleryRow) -> String {
        row.title.clone()
    }

    fn form_from_row(row: &GalleryRow) -> GalleryForm {
        GalleryForm {
            title: row.title.clone(),
            description: row.description.clone(),
            image_urls: row.image_urls.join("\n"),
            event_id: row.event_id,
            taken_on: row.taken_on.map(|d| d.format(DATE_INPUT_FORMAT).to_string()),
        }
    }

    fn revalidate_paths(row: &GalleryRow) -> Vec<String> {
        let mut paths = vec!["/".to_string(), "/gallery".to_string()];
        // 赛事详情页嵌入了关联相册
        if let Some(event_id) = row.event_id {
            paths.push(format!("/events/{event_id}"));
        }
        paths
    }

    async fn list(pool: &PgPool) -> Result<Vec<GalleryRow>> {
        let rows = sqlx::query_as::<_, GalleryRow>(&format!(
            "{GALLERY_SELECT} ORDER BY g.taken_on DESC NULLS LAST, g.id DESC"
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    async fn get(pool: &PgPool, id: i64) -> Result<Option<GalleryRow>> {
        let row = sqlx::query_as::<_, GalleryRow>(&format!("{GALLERY_SELECT} WHERE g.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    async fn insert(pool: &PgPool, form: &GalleryForm) -> Result<GalleryRow> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO gallery_items (title, description, image_urls, event_id, taken_on)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(form.title.trim())
        .bind(trimmed(&form.description))
        .bind(url_lines(&form.image_urls))
        .bind(form.event_id)
        .bind(form.taken_on())
        .fetch_one(pool)
        .await?;
        Self::get(pool, id).await?.ok_or(SiteError::RecordNotFound {
            resource: Self::NAME,
            id,
        })
    }

    async fn update(pool: &PgPool, id: i64, form: &GalleryForm) -> Result<Option<GalleryRow>> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE gallery_items
            SET title = $2, description = $3, image_urls = $4, event_id = $5, taken_on = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(form.title.trim())
        .bind(trimmed(&form.description))
        .bind(url_lines(&form.image_urls))
        .bind(form.event_id)
        .bind(form.taken_on())
        .fetch_optional(pool)
        .await?;
        match updated {
            Some(id) => Self::get(pool, id).await,
            None => Ok(None),
        }
    }

    async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
        delete_by_id(pool, "DELETE FROM gallery_items WHERE id = $1", id).await
    }
}

// ==================== 新闻 ====================

pub struct News;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NewsRow {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub summary: String,
    pub body: String,
    pub cover_url: Option<String>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Validate)]
pub struct NewsForm {
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 160, message = "标题长度必须在1-160个字符之间"),
        custom(function = "not_blank", message = "标题长度必须在1-160个字符之间")
    )]
    pub title: String,
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 300, message = "摘要长度必须在1-300个字符之间"),
        custom(function = "not_blank", message = "摘要长度必须在1-300个字符之间")
    )]
    pub summary: String,
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, message = "正文不能为空"),
        custom(function = "not_blank", message = "正文不能为空")
    )]
    pub body: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(custom(function = "web_url", message = "封面地址必须是有效的链接"))]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub published: bool,
}

impl NewsForm {
    /// 由标题生成的 URL 标识，标题不含字母数字时使用时间戳
    pub fn slug(&self) -> String {
        let slug = slugify(&self.title);
        if slug.is_empty() {
            format!("article-{}", Utc::now().timestamp())
        } else {
            slug
        }
    }
}

const NEWS_COLUMNS: &str =
    "id, title, slug, summary, body, cover_url, published, published_at, created_at, updated_at";

#[async_trait]
impl Resource for News {
    const SLUG: &'static str = "news";
    const NAME: &'static str = "新闻";

    type Row = NewsRow;
    type Form = NewsForm;

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("title", "标题"),
            Column::new("slug", "标识"),
            Column::new("published", "已发布"),
            Column::new("published_at", "发布时间"),
        ];
        COLUMNS
    }

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::new("title", "标题", FieldKind::Text)
                .required()
                .help("链接标识由标题自动生成"),
            Field::new("summary", "摘要", FieldKind::TextArea).required(),
            Field::new("body", "正文", FieldKind::TextArea).required(),
            Field::new("cover_url", "封面", FieldKind::Url),
            Field::new("published", "发布", FieldKind::Checkbox),
        ];
        FIELDS
    }

    fn row_id(row: &NewsRow) -> i64 {
        row.id
    }

    fn row_label(row: &NewsRow) -> String {
        row.title.clone()
    }

    fn form_from_row(row: &NewsRow) -> NewsForm {
        NewsForm {
            title: row.title.clone(),
            summary: row.summary.clone(),
            body: row.body.clone(),
            cover_url: row.cover_url.clone(),
            published: row.published,
        }
    }

    fn revalidate_paths(_row: &NewsRow) -> Vec<String> {
        // `/news` 前缀同时覆盖改名前的旧文章地址
        ["/", "/news"].map(String::from).to_vec()
    }

    async fn list(pool: &PgPool) -> Result<Vec<NewsRow>> {
        let rows = sqlx::query_as::<_, NewsRow>(&format!(
            "SELECT {NEWS_COLUMNS} FROM news_articles ORDER BY created_at DESC"
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    async fn get(pool: &PgPool, id: i64) -> Result<Option<NewsRow>> {
        let row = sqlx::query_as::<_, NewsRow>(&format!(
            "SELECT {NEWS_COLUMNS} FROM news_articles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    async fn insert(pool: &PgPool, form: &NewsForm) -> Result<NewsRow> {
        let row = sqlx::query_as::<_, NewsRow>(&format!(
            r#"
            INSERT INTO news_articles (title, slug, summary, body, cover_url, published, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, CASE WHEN $6 THEN NOW() END)
            RETURNING {NEWS_COLUMNS}
            "#
        ))
        .bind(form.title.trim())
        .bind(form.slug())
        .bind(form.summary.trim())
        .bind(&form.body)
        .bind(trimmed(&form.cover_url))
        .bind(form.published)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    async fn update(pool: &PgPool, id: i64, form: &NewsForm) -> Result<Option<NewsRow>> {
        let row = sqlx::query_as::<_, NewsRow>(&format!(
            r#"
            UPDATE news_articles
            SET title = $2, slug = $3, summary = $4, body = $5, cover_url = $6, published = $7,
                published_at = CASE WHEN $7 THEN COALESCE(published_at, NOW()) END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {NEWS_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(form.title.trim())
        .bind(form.slug())
        .bind(form.summary.trim())
        .bind(&form.body)
        .bind(trimmed(&form.cover_url))
        .bind(form.published)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
        delete_by_id(pool, "DELETE FROM news_articles WHERE id = $1", id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_news_slug_from_title() {
        let form = NewsForm {
            title: "Season Opener: Results & Photos".to_string(),
            ..Default::default()
        };
        assert_eq!(form.slug(), "season-opener-results-photos");

        let symbols = NewsForm {
            title: "!!!".to_string(),
            ..Default::default()
        };
        assert!(symbols.slug().starts_with("article-"));
    }

    #[test]
    fn test_news_form_requires_body() {
        let form = NewsForm {
            title: "赛季揭幕".to_string(),
            summary: "首站比赛".to_string(),
            body: String::new(),
            ..Default::default()
        };
        let errors = super::super::field_errors(&form.validate().unwrap_err());
        assert!(errors.contains_key("body"));
        assert!(!errors.contains_key("title"));
    }

    fn gallery_row(event_id: Option<i64>) -> GalleryRow {
        GalleryRow {
            id: 1,
            title: "决赛日".to_string(),
            description: None,
            image_urls: vec!["/uploads/gallery/a.jpg".to_string()],
            event_id,
            event_title: None,
            taken_on: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_gallery_revalidates_linked_event() {
        let paths = Gallery::revalidate_paths(&gallery_row(Some(7)));
        assert!(paths.contains(&"/events/7".to_string()));
        assert!(paths.contains(&"/gallery".to_string()));

        let unlinked = Gallery::revalidate_paths(&gallery_row(None));
        assert!(!unlinked.iter().any(|p| p.starts_with("/events")));
    }

    #[test]
    fn test_gallery_form_validation() {
        let valid = GalleryForm {
            title: "决赛日".to_string(),
            image_urls: "/uploads/gallery/a.jpg\nhttps://cdn.example.com/b.jpg".to_string(),
            taken_on: Some("2025-05-04".to_string()),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());
        assert_eq!(valid.taken_on(), NaiveDate::from_ymd_opt(2025, 5, 4));

        let no_images = GalleryForm {
            image_urls: "  \n".to_string(),
            ..valid.clone()
        };
        assert!(no_images.validate().is_err());

        let bad_date = GalleryForm {
            taken_on: Some("04/05/2025".to_string()),
            ..valid
        };
        assert!(bad_date.validate().is_err());
    }

    #[test]
    fn test_gallery_row_to_form_joins_urls() {
        let now = Utc::now();
        let row = GalleryRow {
            id: 1,
            title: "排位赛".to_string(),
            description: None,
            image_urls: vec!["/a.jpg".to_string(), "/b.jpg".to_string()],
            event_id: Some(3),
            event_title: Some("春季赛".to_string()),
            taken_on: NaiveDate::from_ymd_opt(2025, 3, 1),
            created_at: now,
            updated_at: now,
        };
        let form = Gallery::form_from_row(&row);
        assert_eq!(form.image_urls, "/a.jpg\n/b.jpg");
        assert_eq!(form.taken_on.as_deref(), Some("2025-03-01"));
    }
}
