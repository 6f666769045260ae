//! 日志订阅者
//!
//! `pretty` 供本地开发，`json` 供生产采集。JSON 模式下请求 span 关闭时输出一行，
//! 带上 `http_tracing` 记录的状态码与耗时。

use anyhow::Result;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::ObservabilityConfig;

/// sqlx 每条语句都会打 info 日志，默认压到 warn
const QUIET_TARGETS: &str = "sqlx=warn,hyper=warn";

/// `RUST_LOG` 优先，其次是配置的级别
fn filter_directives(config: &ObservabilityConfig) -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| format!("{},{}", config.log_level, QUIET_TARGETS))
}

pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_new(filter_directives(config)).unwrap_or_else(|e| {
        eprintln!("invalid log filter ({e}), falling back to info");
        EnvFilter::new("info")
    });

    let fmt_layer = match config.log_format.as_str() {
        "json" => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        _ => fmt::layer().with_target(true).compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_level_keeps_sqlx_quiet() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = ObservabilityConfig {
            log_level: "debug".to_string(),
            ..Default::default()
        };
        let directives = filter_directives(&config);
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("sqlx=warn"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
