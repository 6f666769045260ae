//! Handlebars 模板
//!
//! 所有模板在编译期嵌入二进制，启动时注册一次。页面统一通过 [`Templates::render_page`]
//! 渲染，模板内以 `data.*` 访问页面数据，`chrome.*` 访问布局所需的公共信息。

use chrono::{DateTime, NaiveDate, Utc};
use handlebars::{Handlebars, handlebars_helper};
use serde::Serialize;
use serde_json::json;

use crate::error::{Result, SiteError};

/// (模板名, 模板内容)
const TEMPLATES: &[(&str, &str)] = &[
    ("home", include_str!("../templates/home.hbs")),
    ("calendar", include_str!("../templates/calendar.hbs")),
    ("event", include_str!("../templates/event.hbs")),
    ("gallery", include_str!("../templates/gallery.hbs")),
    ("news_list", include_str!("../templates/news_list.hbs")),
    ("news_article", include_str!("../templates/news_article.hbs")),
    ("tracks", include_str!("../templates/tracks.hbs")),
    ("track", include_str!("../templates/track.hbs")),
    ("products", include_str!("../templates/products.hbs")),
    ("sponsors", include_str!("../templates/sponsors.hbs")),
    ("pilots", include_str!("../templates/pilots.hbs")),
    ("karts", include_str!("../templates/karts.hbs")),
    ("mechanics", include_str!("../templates/mechanics.hbs")),
    ("live", include_str!("../templates/live.hbs")),
    ("login", include_str!("../templates/login.hbs")),
    ("unavailable", include_str!("../templates/unavailable.hbs")),
    ("admin/dashboard", include_str!("../templates/admin/dashboard.hbs")),
    ("admin/list", include_str!("../templates/admin/list.hbs")),
    ("admin/form", include_str!("../templates/admin/form.hbs")),
    ("admin/delete", include_str!("../templates/admin/delete.hbs")),
    ("admin/live_chat", include_str!("../templates/admin/live_chat.hbs")),
];

/// 布局所需的公共信息
#[derive(Debug, Clone, Serialize, Default)]
pub struct Chrome {
    pub site_title: String,
    pub page_title: String,
    /// 是否使用后台导航
    pub admin: bool,
    pub flash: Option<crate::flash::Flash>,
}

/// 模板注册表
pub struct Templates {
    hbs: Handlebars<'static>,
    site_title: String,
}

impl Templates {
    /// 注册全部模板与辅助函数
    pub fn new(site_title: impl Into<String>) -> std::result::Result<Self, handlebars::TemplateError> {
        let mut hbs = Handlebars::new();
        hbs.set_dev_mode(cfg!(debug_assertions));

        handlebars_helper!(date: |t: DateTime<Utc>| t.format("%Y-%m-%d").to_string());
        hbs.register_helper("date", Box::new(date));
        handlebars_helper!(datetime: |t: DateTime<Utc>| t.format("%Y-%m-%d %H:%M").to_string());
        hbs.register_helper("datetime", Box::new(datetime));
        handlebars_helper!(day: |d: NaiveDate| d.format("%Y-%m-%d").to_string());
        hbs.register_helper("day", Box::new(day));
        handlebars_helper!(money: |cents: i64| format_money(cents));
        hbs.register_helper("money", Box::new(money));

        hbs.register_partial("layout", include_str!("../templates/layout.hbs"))?;
        hbs.register_partial("admin_layout", include_str!("../templates/admin/layout.hbs"))?;
        for (name, source) in TEMPLATES {
            hbs.register_template_string(name, *source)?;
        }

        Ok(Self {
            hbs,
            site_title: site_title.into(),
        })
    }

    pub fn site_title(&self) -> &str {
        &self.site_title
    }

    /// 公开页面的布局信息
    pub fn public_chrome(&self, page_title: impl Into<String>) -> Chrome {
        Chrome {
            site_title: self.site_title.clone(),
            page_title: page_title.into(),
            admin: false,
            flash: None,
        }
    }

    /// 后台页面的布局信息
    pub fn admin_chrome(
        &self,
        page_title: impl Into<String>,
        flash: Option<crate::flash::Flash>,
    ) -> Chrome {
        Chrome {
            site_title: self.site_title.clone(),
            page_title: page_title.into(),
            admin: true,
            flash,
        }
    }

    /// 渲染页面
    pub fn render_page<T: Serialize>(&self, template: &str, chrome: &Chrome, data: &T) -> Result<String> {
        let context = json!({ "chrome": chrome, "data": data });
        self.hbs
            .render(template, &context)
            .map_err(|e| SiteError::Template(format!("{}: {}", template, e)))
    }
}

/// 分转为带两位小数的金额
pub fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{}¥{}.{:02}", sign, cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0), "¥0.00");
        assert_eq!(format_money(12345), "¥123.45");
        assert_eq!(format_money(-5), "-¥0.05");
    }

    #[test]
    fn test_all_templates_register() {
        let templates = Templates::new("测试俱乐部").expect("模板应全部注册成功");
        assert_eq!(templates.site_title(), "测试俱乐部");
    }

    #[test]
    fn test_render_login_page() {
        let templates = Templates::new("测试俱乐部").unwrap();
        let chrome = templates.public_chrome("管理员登录");
        let html = templates
            .render_page("login", &chrome, &json!({ "next": "/admin/events", "error": null }))
            .unwrap();
        assert!(html.contains("测试俱乐部"));
        assert!(html.contains("/admin/events"));
    }

    #[test]
    fn test_home_without_upcoming_event() {
        let templates = Templates::new("测试俱乐部").unwrap();
        let chrome = templates.public_chrome("首页");
        let html = templates
            .render_page(
                "home",
                &chrome,
                &json!({ "next_event": null, "countdown": null, "news": [], "sponsors": [] }),
            )
            .unwrap();
        assert!(html.contains("暂无即将开始的赛事"));
        assert!(!html.contains("class=\"countdown\""));
    }

    #[test]
    fn test_admin_layout_shows_flash() {
        let templates = Templates::new("测试俱乐部").unwrap();
        let flash = crate::flash::Flash::from(crate::flash::FlashAction::Saved);
        let chrome = templates.admin_chrome("删除赛道", Some(flash));
        let html = templates
            .render_page(
                "admin/delete",
                &chrome,
                &json!({ "name": "赛道", "label": "<b>天马</b>", "action": "/admin/tracks/1/delete", "cancel_url": "/admin/tracks" }),
            )
            .unwrap();
        assert!(html.contains("toast-success"));
        assert!(html.contains("&lt;b&gt;天马&lt;/b&gt;"));
    }

    #[test]
    fn test_unknown_template_is_error() {
        let templates = Templates::new("x").unwrap();
        let chrome = templates.public_chrome("x");
        let err = templates.render_page("missing", &chrome, &json!({})).unwrap_err();
        assert_eq!(err.error_code(), "TEMPLATE_ERROR");
    }
}
