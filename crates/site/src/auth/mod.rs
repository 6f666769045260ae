//! 管理员认证模块
//!
//! 后台只有一个静态管理员 Token。登录成功后 Token 写入 HttpOnly Cookie，
//! 之后每个 `/admin` 请求都用它与配置中的 Token 比对。

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use kart_shared::config::AuthConfig;
use sha2::{Digest, Sha256};

/// 管理员认证器
///
/// 只保存配置 Token 的 SHA-256 摘要，比较时对摘要做定长比较。
#[derive(Clone)]
pub struct AdminAuth {
    digest: [u8; 32],
    cookie_name: String,
    max_age_days: i64,
    secure: bool,
}

impl AdminAuth {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            digest: Self::hash(config.admin_token.trim()),
            cookie_name: config.cookie_name.clone(),
            max_age_days: config.cookie_max_age_days,
            secure: config.secure_cookie,
        }
    }

    fn hash(token: &str) -> [u8; 32] {
        Sha256::digest(token.as_bytes()).into()
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// 校验提交的 Token
    pub fn verify(&self, candidate: &str) -> bool {
        let candidate = Self::hash(candidate.trim());
        // 逐字节异或累积，耗时与不匹配位置无关
        candidate
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// 请求 Cookie 中是否带有有效的管理员 Token
    pub fn is_authenticated(&self, jar: &CookieJar) -> bool {
        jar.get(&self.cookie_name)
            .map(|cookie| self.verify(cookie.value()))
            .unwrap_or(false)
    }

    /// 登录成功后写入的 Cookie
    pub fn login_cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), token.trim().to_string()))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::days(self.max_age_days))
            .build()
    }

    /// 登出时用于清除的 Cookie（路径需与登录时一致）
    pub fn logout_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), "")).path("/").build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> AdminAuth {
        AdminAuth::new(&AuthConfig {
            admin_token: "pit-lane-secret".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_verify_token() {
        let auth = auth();
        assert!(auth.verify("pit-lane-secret"));
        assert!(auth.verify("  pit-lane-secret\n"));
        assert!(!auth.verify("pit-lane"));
        assert!(!auth.verify(""));
    }

    #[test]
    fn test_login_cookie_attributes() {
        let cookie = auth().login_cookie("pit-lane-secret");
        assert_eq!(cookie.name(), "admin_token");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(7)));
    }

    #[test]
    fn test_is_authenticated_from_jar() {
        let auth = auth();
        let jar = CookieJar::new();
        assert!(!auth.is_authenticated(&jar));

        let jar = jar.add(Cookie::new("admin_token", "wrong"));
        assert!(!auth.is_authenticated(&jar));

        let jar = jar.add(Cookie::new("admin_token", "pit-lane-secret"));
        assert!(auth.is_authenticated(&jar));
    }
}
