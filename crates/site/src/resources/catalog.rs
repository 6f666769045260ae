//! 商品、车辆、技师与赞助商

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use validator::Validate;

use super::{
    Column, Field, FieldKind, Resource, SPONSOR_TIERS, empty_as_none, not_blank, product_urls,
    sponsor_tier, trimmed, trimmed_string, url_lines, web_url,
};
use crate::error::Result;

async fn delete_by_id(pool: &PgPool, sql: &str, id: i64) -> Result<bool> {
    let result = sqlx::query(sql).bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

// ==================== 商品 ====================

pub struct Products;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub image_urls: Vec<String>,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProductForm {
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 120, message = "商品名称长度必须在1-120个字符之间"),
        custom(function = "not_blank", message = "商品名称长度必须在1-120个字符之间")
    )]
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(
        required(message = "请填写价格"),
        range(min = 0, message = "价格不能为负数")
    )]
    pub price_cents: Option<i64>,
    #[serde(default)]
    #[validate(custom(function = "product_urls", message = "最多10个有效的图片链接，每行一个"))]
    pub image_urls: String,
    #[serde(default)]
    pub available: bool,
}

impl Default for ProductForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            price_cents: None,
            image_urls: String::new(),
            available: true,
        }
    }
}

const PRODUCT_COLUMNS: &str =
    "id, name, description, price_cents, image_urls, available, created_at, updated_at";

#[async_trait]
impl Resource for Products {
    const SLUG: &'static str = "products";
    const NAME: &'static str = "商品";

    type Row = ProductRow;
    type Form = ProductForm;

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("name", "名称"),
            Column::new("price_cents", "价格(分)"),
            Column::new("image_urls", "图片"),
            Column::new("available", "在售"),
        ];
        COLUMNS
    }

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::new("name", "名称", FieldKind::Text).required(),
            Field::new("description", "介绍", FieldKind::TextArea),
            Field::new("price_cents", "价格(分)", FieldKind::Number).required(),
            Field::new("image_urls", "图片链接", FieldKind::UrlList).help("每行一个链接，最多10张"),
            Field::new("available", "在售", FieldKind::Checkbox),
        ];
        FIELDS
    }

    fn row_id(row: &ProductRow) -> i64 {
        row.id
    }

    fn row_label(row: &ProductRow) -> String {
        row.name.clone()
    }

    fn form_from_row(row: &ProductRow) -> ProductForm {
        ProductForm {
            name: row.name.clone(),
            description: row.description.clone(),
            price_cents: Some(row.price_cents),
            image_urls: row.image_urls.join("\n"),
            available: row.available,
        }
    }

    fn revalidate_paths(_row: &ProductRow) -> Vec<String> {
        vec!["/products".to_string()]
    }

    async fn list(pool: &PgPool) -> Result<Vec<ProductRow>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name"
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    async fn get(pool: &PgPool, id: i64) -> Result<Option<ProductRow>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    async fn insert(pool: &PgPool, form: &ProductForm) -> Result<ProductRow> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            INSERT INTO products (name, description, price_cents, image_urls, available)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(form.name.trim())
        .bind(trimmed(&form.description))
        .bind(form.price_cents)
        .bind(url_lines(&form.image_urls))
        .bind(form.available)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    async fn update(pool: &PgPool, id: i64, form: &ProductForm) -> Result<Option<ProductRow>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            UPDATE products
            SET name = $2, description = $3, price_cents = $4, image_urls = $5, available = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(form.name.trim())
        .bind(trimmed(&form.description))
        .bind(form.price_cents)
        .bind(url_lines(&form.image_urls))
        .bind(form.available)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
        delete_by_id(pool, "DELETE FROM products WHERE id = $1", id).await
    }
}

// ==================== 车辆 ====================

pub struct Karts;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct KartRow {
    pub id: i64,
    pub model: String,
    pub engine: String,
    pub chassis: Option<String>,
    pub year: i32,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Validate)]
pub struct KartForm {
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 100, message = "车型长度必须在1-100个字符之间"),
        custom(function = "not_blank", message = "车型长度必须在1-100个字符之间")
    )]
    pub model: String,
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 100, message = "引擎长度必须在1-100个字符之间"),
        custom(function = "not_blank", message = "引擎长度必须在1-100个字符之间")
    )]
    pub engine: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 100, message = "车架不能超过100个字符"))]
    pub chassis: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(
        required(message = "请填写年份"),
        range(min = 1990, max = 2100, message = "年份必须在1990-2100之间")
    )]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(custom(function = "web_url", message = "图片地址必须是有效的链接"))]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub description: Option<String>,
}

const KART_COLUMNS: &str =
    "id, model, engine, chassis, year, image_url, description, created_at, updated_at";

#[async_trait]
impl Resource for Karts {
    const SLUG: &'static str = "karts";
    const NAME: &'static str = "车辆";

    type Row = KartRow;
    type Form = KartForm;

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("model", "车型"),
            Column::new("engine", "引擎"),
            Column::new("chassis", "车架"),
            Column::new("year", "年份"),
        ];
        COLUMNS
    }

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::new("model", "车型", FieldKind::Text).required(),
            Field::new("engine", "引擎", FieldKind::Text).required(),
            Field::new("chassis", "车架", FieldKind::Text),
            Field::new("year", "年份", FieldKind::Number).required(),
            Field::new("image_url", "图片", FieldKind::Url),
            Field::new("description", "介绍", FieldKind::TextArea),
        ];
        FIELDS
    }

    fn row_id(row: &KartRow) -> i64 {
        row.id
    }

    fn row_label(row: &KartRow) -> String {
        format!("{} ({})", row.model, row.year)
    }

    fn form_from_row(row: &KartRow) -> KartForm {
        KartForm {
            model: row.model.clone(),
            engine: row.engine.clone(),
            chassis: row.chassis.clone(),
            year: Some(row.year),
            image_url: row.image_url.clone(),
            description: row.description.clone(),
        }
    }

    fn revalidate_paths(_row: &KartRow) -> Vec<String> {
        vec!["/karts".to_string()]
    }

    async fn list(pool: &PgPool) -> Result<Vec<KartRow>> {
        let rows = sqlx::query_as::<_, KartRow>(&format!(
            "SELECT {KART_COLUMNS} FROM karts ORDER BY year DESC, model"
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    async fn get(pool: &PgPool, id: i64) -> Result<Option<KartRow>> {
        let row = sqlx::query_as::<_, KartRow>(&format!(
            "SELECT {KART_COLUMNS} FROM karts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    async fn insert(pool: &PgPool, form: &KartForm) -> Result<KartRow> {
        let row = sqlx::query_as::<_, KartRow>(&format!(
            r#"
            INSERT INTO karts (model, engine, chassis, year, image_url, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {KART_COLUMNS}
            "#
        ))
        .bind(form.model.trim())
        .bind(form.engine.trim())
        .bind(trimmed(&form.chassis))
        .bind(form.year)
        .bind(trimmed(&form.image_url))
        .bind(trimmed(&form.description))
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    async fn update(pool: &PgPool, id: i64, form: &KartForm) -> Result<Option<KartRow>> {
        let row = sqlx::query_as::<_, KartRow>(&format!(
            r#"
            UPDATE karts
            SET model = $2, engine = $3, chassis = $4, year = $5, image_url = $6,
                description = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING {KART_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(form.model.trim())
        .bind(form.engine.trim())
        .bind(trimmed(&form.chassis))
        .bind(form.year)
        .bind(trimmed(&form.image_url))
        .bind(trimmed(&form.description))
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
        delete_by_id(pool, "DELETE FROM karts WHERE id = $1", id).await
    }
}

// ==================== 技师 ====================

pub struct Mechanics;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MechanicRow {
    pub id: i64,
    pub name: String,
    pub specialty: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Validate)]
pub struct MechanicForm {
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 100, message = "姓名长度必须在1-100个字符之间"),
        custom(function = "not_blank", message = "姓名长度必须在1-100个字符之间")
    )]
    pub name: String,
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 100, message = "专长长度必须在1-100个字符之间"),
        custom(function = "not_blank", message = "专长长度必须在1-100个字符之间")
    )]
    pub specialty: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 40, message = "电话不能超过40个字符"))]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(email(message = "邮箱格式无效"))]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(custom(function = "web_url", message = "照片地址必须是有效的链接"))]
    pub photo_url: Option<String>,
}

const MECHANIC_COLUMNS: &str = "id, name, specialty, phone, email, photo_url, created_at, updated_at";

#[async_trait]
impl Resource for Mechanics {
    const SLUG: &'static str = "mechanics";
    const NAME: &'static str = "技师";

    type Row = MechanicRow;
    type Form = MechanicForm;

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("name", "姓名"),
            Column::new("specialty", "专长"),
            Column::new("phone", "电话"),
            Column::new("email", "邮箱"),
        ];
        COLUMNS
    }

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::new("name", "姓名", FieldKind::Text).required(),
            Field::new("specialty", "专长", FieldKind::Text).required(),
            Field::new("phone", "电话", FieldKind::Text),
            Field::new("email", "邮箱", FieldKind::Email),
            Field::new("photo_url", "照片", FieldKind::Url),
        ];
        FIELDS
    }

    fn row_id(row: &MechanicRow) -> i64 {
        row.id
    }

    fn row_label(row: &MechanicRow) -> String {
        row.name.clone()
    }

    fn form_from_row(row: &MechanicRow) -> MechanicForm {
        MechanicForm {
            name: row.name.clone(),
            specialty: row.specialty.clone(),
            phone: row.phone.clone(),
            email: row.email.clone(),
            photo_url: row.photo_url.clone(),
        }
    }

    fn revalidate_paths(_row: &MechanicRow) -> Vec<String> {
        vec!["/mechanics".to_string()]
    }

    async fn list(pool: &PgPool) -> Result<Vec<MechanicRow>> {
        let rows = sqlx::query_as::<_, MechanicRow>(&format!(
            "SELECT {MECHANIC_COLUMNS} FROM mechanics ORDER BY name"
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    async fn get(pool: &PgPool, id: i64) -> Result<Option<MechanicRow>> {
        let row = sqlx::query_as::<_, MechanicRow>(&format!(
            "SELECT {MECHANIC_COLUMNS} FROM mechanics WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    async fn insert(pool: &PgPool, form: &MechanicForm) -> Result<MechanicRow> {
        let row = sqlx::query_as::<_, MechanicRow>(&format!(
            r#"
            INSERT INTO mechanics (name, specialty, phone, email, photo_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MECHANIC_COLUMNS}
            "#
        ))
        .bind(form.name.trim())
        .bind(form.specialty.trim())
        .bind(trimmed(&form.phone))
        .bind(trimmed(&form.email))
        .bind(trimmed(&form.photo_url))
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    async fn update(pool: &PgPool, id: i64, form: &MechanicForm) -> Result<Option<MechanicRow>> {
        let row = sqlx::query_as::<_, MechanicRow>(&format!(
            r#"
            UPDATE mechanics
            SET name = $2, specialty = $3, phone = $4, email = $5, photo_url = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING {MECHANIC_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(form.name.trim())
        .bind(form.specialty.trim())
        .bind(trimmed(&form.phone))
        .bind(trimmed(&form.email))
        .bind(trimmed(&form.photo_url))
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
        delete_by_id(pool, "DELETE FROM mechanics WHERE id = $1", id).await
    }
}

// ==================== 赞助商 ====================

pub struct Sponsors;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SponsorRow {
    pub id: i64,
    pub name: String,
    pub logo_url: String,
    pub website_url: Option<String>,
    pub tier: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SponsorForm {
    #[serde(default, deserialize_with = "trimmed_string")]
    #[validate(
        length(min = 1, max = 100, message = "赞助商名称长度必须在1-100个字符之间"),
        custom(function = "not_blank", message = "赞助商名称长度必须在1-100个字符之间")
    )]
    pub name: String,
    #[serde(default)]
    #[validate(custom(function = "web_url", message = "请填写有效的标志图片链接"))]
    pub logo_url: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(custom(function = "web_url", message = "官网必须是有效的链接"))]
    pub website_url: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "sponsor_tier", message = "赞助等级无效"))]
    pub tier: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub sort_order: Option<i32>,
}

impl Default for SponsorForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            logo_url: String::new(),
            website_url: None,
            tier: "bronze".to_string(),
            sort_order: Some(0),
        }
    }
}

const SPONSOR_COLUMNS: &str =
    "id, name, logo_url, website_url, tier, sort_order, created_at, updated_at";

#[async_trait]
impl Resource for Sponsors {
    const SLUG: &'static str = "sponsors";
    const NAME: &'static str = "赞助商";

    type Row = SponsorRow;
    type Form = SponsorForm;

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("name", "名称"),
            Column::new("tier", "等级"),
            Column::new("sort_order", "排序"),
            Column::new("website_url", "官网"),
        ];
        COLUMNS
    }

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::new("name", "名称", FieldKind::Text).required(),
            Field::new("logo_url", "标志图片", FieldKind::Url).required(),
            Field::new("website_url", "官网", FieldKind::Url),
            Field::new("tier", "等级", FieldKind::Choice(SPONSOR_TIERS)).required(),
            Field::new("sort_order", "排序", FieldKind::Number).help("数字越小越靠前"),
        ];
        FIELDS
    }

    fn row_id(row: &SponsorRow) -> i64 {
        row.id
    }

    fn row_label(row: &SponsorRow) -> String {
        row.name.clone()
    }

    fn form_from_row(row: &SponsorRow) -> SponsorForm {
        SponsorForm {
            name: row.name.clone(),
            logo_url: row.logo_url.clone(),
            website_url: row.website_url.clone(),
            tier: row.tier.clone(),
            sort_order: Some(row.sort_order),
        }
    }

    fn revalidate_paths(_row: &SponsorRow) -> Vec<String> {
        ["/", "/sponsors"].map(String::from).to_vec()
    }

    async fn list(pool: &PgPool) -> Result<Vec<SponsorRow>> {
        let rows = sqlx::query_as::<_, SponsorRow>(&format!(
            r#"
            SELECT {SPONSOR_COLUMNS} FROM sponsors
            ORDER BY CASE tier WHEN 'gold' THEN 0 WHEN 'silver' THEN 1 ELSE 2 END, sort_order, name
            "#
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    async fn get(pool: &PgPool, id: i64) -> Result<Option<SponsorRow>> {
        let row = sqlx::query_as::<_, SponsorRow>(&format!(
            "SELECT {SPONSOR_COLUMNS} FROM sponsors WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    async fn insert(pool: &PgPool, form: &SponsorForm) -> Result<SponsorRow> {
        let row = sqlx::query_as::<_, SponsorRow>(&format!(
            r#"
            INSERT INTO sponsors (name, logo_url, website_url, tier, sort_order)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SPONSOR_COLUMNS}
            "#
        ))
        .bind(form.name.trim())
        .bind(form.logo_url.trim())
        .bind(trimmed(&form.website_url))
        .bind(&form.tier)
        .bind(form.sort_order.unwrap_or(0))
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    async fn update(pool: &PgPool, id: i64, form: &SponsorForm) -> Result<Option<SponsorRow>> {
        let row = sqlx::query_as::<_, SponsorRow>(&format!(
            r#"
            UPDATE sponsors
            SET name = $2, logo_url = $3, website_url = $4, tier = $5, sort_order = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SPONSOR_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(form.name.trim())
        .bind(form.logo_url.trim())
        .bind(trimmed(&form.website_url))
        .bind(&form.tier)
        .bind(form.sort_order.unwrap_or(0))
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
        delete_by_id(pool, "DELETE FROM sponsors WHERE id = $1", id).await
    }
}
