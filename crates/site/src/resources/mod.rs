//! 后台可管理的内容资源
//!
//! 每种实体实现一次 [`Resource`]，后台的列表、表单、删除确认等页面都是对该 trait 的泛型实现。
//! 表单字段在 Rust 中描述（[`Field`]），渲染时与表单值、校验错误合并成 [`FieldView`]。

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgRow;
use validator::{Validate, ValidateUrl, ValidationError, ValidationErrors};

use crate::error::{Result, SiteError};

pub mod catalog;
pub mod content;
pub mod racing;

pub use catalog::{Karts, Mechanics, Products, Sponsors};
pub use content::{Categories, Gallery, News};
pub use racing::{Events, Pilots, Podiums, Tracks};

/// datetime-local 输入框的格式
pub const DATETIME_INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";
/// date 输入框的格式
pub const DATE_INPUT_FORMAT: &str = "%Y-%m-%d";

/// 后台导航与仪表盘使用的资源清单：(slug, 名称, 表名)
pub const REGISTRY: &[(&str, &str, &str)] = &[
    (Categories::SLUG, Categories::NAME, "categories"),
    (Tracks::SLUG, Tracks::NAME, "tracks"),
    (Events::SLUG, Events::NAME, "events"),
    (Pilots::SLUG, Pilots::NAME, "pilots"),
    (Podiums::SLUG, Podiums::NAME, "podiums"),
    (Gallery::SLUG, Gallery::NAME, "gallery_items"),
    (News::SLUG, News::NAME, "news_articles"),
    (Products::SLUG, Products::NAME, "products"),
    (Karts::SLUG, Karts::NAME, "karts"),
    (Mechanics::SLUG, Mechanics::NAME, "mechanics"),
    (Sponsors::SLUG, Sponsors::NAME, "sponsors"),
];

/// 赛事状态
pub const EVENT_STATUSES: &[(&str, &str)] = &[
    ("scheduled", "未开始"),
    ("finished", "已结束"),
    ("cancelled", "已取消"),
];

/// 赞助商等级
pub const SPONSOR_TIERS: &[(&str, &str)] = &[("gold", "金牌"), ("silver", "银牌"), ("bronze", "铜牌")];

/// 表单控件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    TextArea,
    Number,
    Url,
    Email,
    DateTime,
    Date,
    Checkbox,
    /// 固定选项
    Choice(&'static [(&'static str, &'static str)]),
    /// 关联表选项，值为 [`load_reference_options`] 的键
    Reference(&'static str),
    /// 每行一个 URL
    UrlList,
}

/// 表单字段定义
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub help: Option<&'static str>,
}

impl Field {
    pub const fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
            help: None,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

/// 列表页的列
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub key: &'static str,
    pub label: &'static str,
}

impl Column {
    pub const fn new(key: &'static str, label: &'static str) -> Self {
        Self { key, label }
    }
}

/// 下拉选项
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// 按键分组的关联选项
pub type SelectOptions = HashMap<&'static str, Vec<SelectOption>>;

/// 字段级校验错误
pub type FieldErrors = HashMap<String, String>;

/// 后台管理的内容资源
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// URL 中的标识，如 `/admin/tracks`
    const SLUG: &'static str;
    /// 显示名称
    const NAME: &'static str;

    type Row: Serialize + Send + Sync + Unpin + for<'r> sqlx::FromRow<'r, PgRow>;
    type Form: DeserializeOwned + Serialize + Validate + Default + Send + Sync;

    fn columns() -> &'static [Column];
    fn fields() -> &'static [Field];

    fn row_id(row: &Self::Row) -> i64;
    /// 删除确认等场景的记录名称
    fn row_label(row: &Self::Row) -> String;
    fn form_from_row(row: &Self::Row) -> Self::Form;

    /// 依赖该记录的公开页面路径
    fn revalidate_paths(row: &Self::Row) -> Vec<String>;

    async fn list(pool: &PgPool) -> Result<Vec<Self::Row>>;
    async fn get(pool: &PgPool, id: i64) -> Result<Option<Self::Row>>;
    async fn insert(pool: &PgPool, form: &Self::Form) -> Result<Self::Row>;
    /// 记录不存在时返回 `None`
    async fn update(pool: &PgPool, id: i64, form: &Self::Form) -> Result<Option<Self::Row>>;
    async fn delete(pool: &PgPool, id: i64) -> Result<bool>;

    /// 无 id 时新增，有 id 时更新
    async fn save(pool: &PgPool, id: Option<i64>, form: &Self::Form) -> Result<Self::Row> {
        match id {
            None => Self::insert(pool, form).await,
            Some(id) => Self::update(pool, id, form)
                .await?
                .ok_or(SiteError::RecordNotFound {
                    resource: Self::NAME,
                    id,
                }),
        }
    }

    /// 加载表单中所有关联字段的选项
    async fn select_options(pool: &PgPool) -> Result<SelectOptions> {
        let mut options = SelectOptions::new();
        for field in Self::fields() {
            if let FieldKind::Reference(key) = field.kind {
                if !options.contains_key(key) {
                    options.insert(key, load_reference_options(pool, key).await?);
                }
            }
        }
        Ok(options)
    }
}

/// 关联表的下拉选项
pub async fn load_reference_options(pool: &PgPool, key: &str) -> Result<Vec<SelectOption>> {
    let sql = match key {
        "tracks" => "SELECT id::TEXT AS value, name AS label FROM tracks ORDER BY name",
        "categories" => "SELECT id::TEXT AS value, name AS label FROM categories ORDER BY name",
        "events" => {
            "SELECT id::TEXT AS value, title || ' (' || to_char(starts_at, 'YYYY-MM-DD') || ')' AS label \
             FROM events ORDER BY starts_at DESC"
        }
        "pilots" => {
            "SELECT id::TEXT AS value, '#' || number || ' ' || name AS label FROM pilots ORDER BY number"
        }
        other => return Err(SiteError::Internal(format!("未知的选项来源: {}", other))),
    };
    let rows = sqlx::query_as::<_, SelectOption>(sql).fetch_all(pool).await?;
    Ok(rows)
}

// ==================== 表单视图 ====================

/// 下拉选项视图
#[derive(Debug, Clone, Serialize)]
pub struct OptionView {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// 渲染到模板的表单字段
#[derive(Debug, Clone, Serialize)]
pub struct FieldView {
    pub name: &'static str,
    pub label: &'static str,
    pub input_type: &'static str,
    pub textarea: bool,
    pub select: bool,
    pub checkbox: bool,
    pub value: String,
    pub checked: bool,
    pub required: bool,
    pub help: Option<&'static str>,
    pub error: Option<String>,
    pub options: Vec<OptionView>,
}

/// 列表页的行
#[derive(Debug, Clone, Serialize)]
pub struct RowView {
    pub id: i64,
    pub cells: Vec<String>,
}

/// 表单值转为输入框文本
fn input_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

/// 合并字段定义、表单值和校验错误
pub fn field_views<F: Serialize>(
    fields: &[Field],
    form: &F,
    errors: &FieldErrors,
    options: &SelectOptions,
) -> Result<Vec<FieldView>> {
    let values = serde_json::to_value(form)?;
    let views = fields
        .iter()
        .map(|field| {
            let value = input_value(values.get(field.name));
            let (input_type, textarea, select, checkbox) = match field.kind {
                FieldKind::Text => ("text", false, false, false),
                FieldKind::Number => ("number", false, false, false),
                FieldKind::Url => ("url", false, false, false),
                FieldKind::Email => ("email", false, false, false),
                FieldKind::DateTime => ("datetime-local", false, false, false),
                FieldKind::Date => ("date", false, false, false),
                FieldKind::TextArea | FieldKind::UrlList => ("text", true, false, false),
                FieldKind::Choice(_) | FieldKind::Reference(_) => ("text", false, true, false),
                FieldKind::Checkbox => ("checkbox", false, false, true),
            };
            let choices: Vec<OptionView> = match field.kind {
                FieldKind::Choice(choices) => choices
                    .iter()
                    .map(|(v, l)| OptionView {
                        value: v.to_string(),
                        label: l.to_string(),
                        selected: *v == value,
                    })
                    .collect(),
                FieldKind::Reference(key) => options
                    .get(key)
                    .map(|list| {
                        list.iter()
                            .map(|o| OptionView {
                                value: o.value.clone(),
                                label: o.label.clone(),
                                selected: o.value == value,
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
                _ => Vec::new(),
            };
            FieldView {
                name: field.name,
                label: field.label,
                input_type,
                textarea,
                select,
                checkbox,
                checked: checkbox && value == "true",
                value,
                required: field.required,
                help: field.help,
                error: errors.get(field.name).cloned(),
                options: choices,
            }
        })
        .collect();
    Ok(views)
}

/// 单元格展示文本
fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::Bool(true)) => "是".to_string(),
        Some(Value::Bool(false)) => "否".to_string(),
        Some(Value::Array(items)) => format!("{} 项", items.len()),
        Some(Value::String(s)) => {
            if let Ok(t) = DateTime::parse_from_rfc3339(s) {
                return t.with_timezone(&Utc).format("%Y-%m-%d %H:%M").to_string();
            }
            truncate(s, 60)
        }
        Some(other) => other.to_string(),
    }
}

/// 按字符截断
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}

/// 记录转为列表行
pub fn row_views<R: Resource>(rows: &[R::Row]) -> Result<Vec<RowView>> {
    rows.iter()
        .map(|row| {
            let value = serde_json::to_value(row)?;
            let cells = R::columns()
                .iter()
                .map(|column| cell_text(value.get(column.key)))
                .collect();
            Ok(RowView {
                id: R::row_id(row),
                cells,
            })
        })
        .collect()
}

/// 提取每个字段的第一条错误信息
pub fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, list)| {
            let message = list.first().map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} 无效", field))
            })?;
            Some((field.to_string(), message))
        })
        .collect()
}

// ==================== 表单解析与校验 ====================

/// 空字符串视为未填写
pub fn empty_as_none<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// 去掉首尾空白，校验与入库看到的是同一个值
pub fn trimmed_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

/// 必填文本不能只有空白
pub fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank"))
    } else {
        Ok(())
    }
}

/// 可公开访问的链接：站内绝对路径或 http(s) URL
pub fn web_url(value: &str) -> std::result::Result<(), ValidationError> {
    let value = value.trim();
    let ok = if value.starts_with('/') {
        !value.starts_with("//")
    } else {
        (value.starts_with("http://") || value.starts_with("https://")) && value.validate_url()
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new("url"))
    }
}

/// 按行拆分 URL 列表，忽略空行
pub fn url_lines(value: &str) -> Vec<String> {
    value
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn url_list(value: &str, min: usize, max: usize) -> std::result::Result<(), ValidationError> {
    let urls = url_lines(value);
    if urls.len() < min || urls.len() > max {
        return Err(ValidationError::new("url_count"));
    }
    urls.iter().try_for_each(|u| web_url(u))
}

/// 图库图片：1-30 个链接
pub fn gallery_urls(value: &str) -> std::result::Result<(), ValidationError> {
    url_list(value, 1, 30)
}

/// 商品图片：最多 10 个链接
pub fn product_urls(value: &str) -> std::result::Result<(), ValidationError> {
    url_list(value, 0, 10)
}

fn one_of(value: &str, set: &[(&str, &str)]) -> std::result::Result<(), ValidationError> {
    if set.iter().any(|(v, _)| *v == value) {
        Ok(())
    } else {
        Err(ValidationError::new("one_of"))
    }
}

pub fn event_status(value: &str) -> std::result::Result<(), ValidationError> {
    one_of(value, EVENT_STATUSES)
}

pub fn sponsor_tier(value: &str) -> std::result::Result<(), ValidationError> {
    one_of(value, SPONSOR_TIERS)
}

/// 解析 datetime-local 输入（按 UTC 处理）
pub fn parse_datetime_input(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, DATETIME_INPUT_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|t| t.and_utc())
}

pub fn parse_date_input(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_INPUT_FORMAT).ok()
}

pub fn datetime_input(value: &str) -> std::result::Result<(), ValidationError> {
    parse_datetime_input(value)
        .map(|_| ())
        .ok_or_else(|| ValidationError::new("datetime"))
}

pub fn date_input(value: &str) -> std::result::Result<(), ValidationError> {
    parse_date_input(value)
        .map(|_| ())
        .ok_or_else(|| ValidationError::new("date"))
}

pub fn format_datetime_input(value: &DateTime<Utc>) -> String {
    value.format(DATETIME_INPUT_FORMAT).to_string()
}

static SLUG_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("静态正则"));

/// 由标题生成 URL 标识：字母数字保留并转小写，其余字符折叠为短横线
pub fn slugify(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    SLUG_SEPARATORS
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// 空白字符串转为 `None`
pub fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize, Validate)]
    struct SampleForm {
        #[validate(length(min = 1, message = "名称不能为空"))]
        name: String,
        #[serde(default, deserialize_with = "empty_as_none")]
        #[validate(custom(function = "web_url", message = "链接无效"))]
        link: Option<String>,
        #[serde(default)]
        enabled: bool,
        #[validate(custom(function = "event_status", message = "状态无效"))]
        status: String,
    }

    const SAMPLE_FIELDS: &[Field] = &[
        Field::new("name", "名称", FieldKind::Text).required(),
        Field::new("link", "链接", FieldKind::Url),
        Field::new("enabled", "启用", FieldKind::Checkbox),
        Field::new("status", "状态", FieldKind::Choice(EVENT_STATUSES)),
    ];

    #[test]
    fn test_web_url() {
        assert!(web_url("https://example.com/a.png").is_ok());
        assert!(web_url("/uploads/gallery/1.png").is_ok());
        assert!(web_url("//evil.example").is_err());
        assert!(web_url("javascript:alert(1)").is_err());
        assert!(web_url("not a url").is_err());
    }

    #[test]
    fn test_gallery_url_count() {
        assert!(gallery_urls("").is_err());
        assert!(gallery_urls("https://a.example/1.jpg\n\n/uploads/2.jpg").is_ok());
        let too_many = (0..31).map(|i| format!("/uploads/{i}.jpg")).collect::<Vec<_>>().join("\n");
        assert!(gallery_urls(&too_many).is_err());
        assert!(product_urls("").is_ok());
        assert!(product_urls("https://a.example/1.jpg\nbad").is_err());
    }

    #[test]
    fn test_enum_membership() {
        assert!(event_status("finished").is_ok());
        assert!(event_status("postponed").is_err());
        assert!(sponsor_tier("gold").is_ok());
        assert!(sponsor_tier("platinum").is_err());
    }

    #[test]
    fn test_datetime_input() {
        let t = parse_datetime_input("2025-06-01T14:30").unwrap();
        assert_eq!(format_datetime_input(&t), "2025-06-01T14:30");
        assert!(datetime_input("2025-06-01").is_err());
        assert!(date_input("2025-06-01").is_ok());
        assert!(date_input("06/01/2025").is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Grand Prix 2025: Final! "), "grand-prix-2025-final");
        assert_eq!(slugify("卡丁车 周末赛"), "卡丁车-周末赛");
        assert_eq!(slugify("--"), "");
    }

    #[test]
    fn test_field_errors_are_per_field() {
        let form = SampleForm {
            name: String::new(),
            link: Some("ftp:/x".to_string()),
            enabled: false,
            status: "postponed".to_string(),
        };
        let errors = field_errors(&form.validate().unwrap_err());
        assert_eq!(errors.get("name").map(String::as_str), Some("名称不能为空"));
        assert_eq!(errors.get("link").map(String::as_str), Some("链接无效"));
        assert_eq!(errors.get("status").map(String::as_str), Some("状态无效"));
    }

    #[test]
    fn test_field_views_merge_values_and_errors() {
        let form = SampleForm {
            name: "周末赛".to_string(),
            link: None,
            enabled: true,
            status: "finished".to_string(),
        };
        let mut errors = FieldErrors::new();
        errors.insert("link".to_string(), "链接无效".to_string());

        let views = field_views(SAMPLE_FIELDS, &form, &errors, &SelectOptions::new()).unwrap();
        assert_eq!(views[0].value, "周末赛");
        assert!(views[0].required);
        assert_eq!(views[1].value, "");
        assert_eq!(views[1].error.as_deref(), Some("链接无效"));
        assert!(views[2].checkbox && views[2].checked);
        assert!(views[3].select);
        assert!(views[3].options.iter().any(|o| o.value == "finished" && o.selected));
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(None), "-");
        assert_eq!(cell_text(Some(&Value::Bool(true))), "是");
        assert_eq!(cell_text(Some(&serde_json::json!(["a", "b"]))), "2 项");
        assert_eq!(
            cell_text(Some(&Value::String("2025-06-01T14:30:00Z".into()))),
            "2025-06-01 14:30"
        );
        assert_eq!(cell_text(Some(&Value::String("x".repeat(61)))).chars().count(), 61);
    }
}
