//! 后台操作提示（Toast）
//!
//! 写操作完成后重定向到列表页，提示信息通过短期 Cookie 传递并在下一次页面渲染时清除。
//! Cookie 中只存 ASCII 编码的 `kind:action`，展示文字在服务端生成。

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Serialize;

const FLASH_COOKIE: &str = "flash";

/// 提示类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
}

/// 触发提示的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashAction {
    Saved,
    Deleted,
    /// 记录仍被引用，无法删除
    Conflict,
    Failed,
    LoggedIn,
}

impl FlashAction {
    fn code(self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::Deleted => "deleted",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
            Self::LoggedIn => "logged_in",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "saved" => Some(Self::Saved),
            "deleted" => Some(Self::Deleted),
            "conflict" => Some(Self::Conflict),
            "failed" => Some(Self::Failed),
            "logged_in" => Some(Self::LoggedIn),
            _ => None,
        }
    }

    fn kind(self) -> FlashKind {
        match self {
            Self::Saved | Self::Deleted | Self::LoggedIn => FlashKind::Success,
            Self::Conflict | Self::Failed => FlashKind::Error,
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::Saved => "保存成功",
            Self::Deleted => "删除成功",
            Self::Conflict => "该记录仍被其他数据引用，无法删除",
            Self::Failed => "操作失败，请稍后重试",
            Self::LoggedIn => "已登录管理后台",
        }
    }
}

/// 渲染到页面上的提示
#[derive(Debug, Clone, Serialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl From<FlashAction> for Flash {
    fn from(action: FlashAction) -> Self {
        Self {
            kind: action.kind(),
            message: action.message().to_string(),
        }
    }
}

/// 写入提示 Cookie
pub fn set(jar: CookieJar, action: FlashAction) -> CookieJar {
    let cookie = Cookie::build((FLASH_COOKIE, action.code()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();
    jar.add(cookie)
}

/// 读取并清除提示 Cookie
pub fn take(jar: CookieJar) -> (CookieJar, Option<Flash>) {
    let Some(cookie) = jar.get(FLASH_COOKIE) else {
        return (jar, None);
    };
    let flash = FlashAction::from_code(cookie.value()).map(Flash::from);
    let jar = jar.remove(Cookie::build(FLASH_COOKIE).path("/"));
    (jar, flash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_take() {
        let jar = set(CookieJar::new(), FlashAction::Deleted);
        let (jar, flash) = take(jar);

        let flash = flash.expect("应读取到提示");
        assert_eq!(flash.kind, FlashKind::Success);
        assert_eq!(flash.message, "删除成功");

        let (_, again) = take(jar);
        assert!(again.is_none());
    }

    #[test]
    fn test_unknown_code_is_ignored() {
        let jar = CookieJar::new().add(Cookie::new(FLASH_COOKIE, "bogus"));
        let (_, flash) = take(jar);
        assert!(flash.is_none());
    }

    #[test]
    fn test_conflict_is_error() {
        assert_eq!(Flash::from(FlashAction::Conflict).kind, FlashKind::Error);
    }
}
