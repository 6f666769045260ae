//! 日志、指标与请求中间件
//!
//! 进程启动时调用一次 [`init`]，返回的守卫需持有到退出。

pub mod logging;
pub mod metrics;
pub mod middleware;

use ::tracing::info;
use anyhow::Result;

use crate::config::ObservabilityConfig;

/// 持有指标导出任务
pub struct ObservabilityGuard {
    _metrics: Option<metrics::MetricsHandle>,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        info!("Observability shut down");
    }
}

/// 先装日志订阅者，再按配置启动 Prometheus 导出
///
/// ```ignore
/// let config = AppConfig::load("kart-site")?;
/// let _guard = observability::init(&config.service_name, &config.observability).await?;
/// ```
pub async fn init(service_name: &str, config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    logging::init(config)?;

    let metrics = if config.metrics_enabled {
        Some(metrics::init(service_name, config.metrics_port).await?)
    } else {
        None
    };

    info!(
        service = %service_name,
        log_format = %config.log_format,
        metrics_port = config.metrics_enabled.then_some(config.metrics_port),
        "Observability initialized"
    );

    Ok(ObservabilityGuard { _metrics: metrics })
}
