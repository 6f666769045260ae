//! Prometheus 指标
//!
//! 站点关心的几类计数：页面缓存命中、失效、后台写操作、埋点与聊天。
//! path 标签一律使用路由模板或页面模板名，不放具体 ID。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics::Label;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// (指标名, 说明)，出现在 /metrics 的 HELP 注释中
const COUNTERS: &[(&str, &str)] = &[
    ("http_requests_total", "Total number of HTTP requests"),
    ("page_renders_total", "Public page responses by cache outcome"),
    ("page_revalidations_total", "Page cache invalidations"),
    ("admin_mutations_total", "Admin create/update/delete actions"),
    ("analytics_events_total", "Client analytics events received"),
    ("chat_messages_total", "Live chat messages posted"),
];

/// 指标导出服务，丢弃时不会停止任务，关闭由进程退出完成
pub struct MetricsHandle {
    _server: JoinHandle<()>,
}

/// 安装 Prometheus recorder，并在独立端口暴露 `/metrics`
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    for (name, help) in COUNTERS {
        metrics::describe_counter!(*name, *help);
    }
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        metrics::Unit::Seconds,
        "HTTP request duration"
    );
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);

    let server = serve(SocketAddr::from(([0, 0, 0, 0], port)), handle).await?;
    Ok(MetricsHandle { _server: server })
}

async fn serve(addr: SocketAddr, handle: PrometheusHandle) -> Result<JoinHandle<()>> {
    let app = Router::new().route("/metrics", get(move || std::future::ready(handle.render())));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Metrics exporter listening");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Metrics exporter stopped");
        }
    }))
}

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, route: &str, status: u16, duration_secs: f64) {
    let labels = vec![
        Label::new("method", method.to_string()),
        Label::new("route", route.to_string()),
        Label::new("status", status.to_string()),
    ];
    metrics::counter!("http_requests_total", labels.clone()).increment(1);
    metrics::histogram!("http_request_duration_seconds", labels).record(duration_secs);
}

/// 记录公开页面响应（是否命中缓存）
#[inline]
pub fn record_page_render(page: &str, cache_hit: bool) {
    metrics::counter!(
        "page_renders_total",
        "page" => page.to_string(),
        "cache" => if cache_hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// 记录页面失效，标签只取路径首段（`/events/7` 记为 `/events`）
#[inline]
pub fn record_revalidation(path: &str) {
    metrics::counter!("page_revalidations_total", "section" => path_section(path)).increment(1);
}

/// 路径的首段，用作有界的指标标签
pub fn path_section(path: &str) -> String {
    match path.trim_start_matches('/').split('/').next() {
        Some(first) if !first.is_empty() => format!("/{first}"),
        _ => "/".to_string(),
    }
}

/// 记录后台写操作
#[inline]
pub fn record_admin_mutation(resource: &str, action: &str) {
    metrics::counter!(
        "admin_mutations_total",
        "resource" => resource.to_string(),
        "action" => action.to_string()
    )
    .increment(1);
}

/// 记录收到的客户端埋点事件数
#[inline]
pub fn record_analytics_events(count: usize) {
    metrics::counter!("analytics_events_total").increment(count as u64);
}

/// 记录直播聊天消息
#[inline]
pub fn record_chat_message() {
    metrics::counter!("chat_messages_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 未安装 recorder 时记录为空操作
        record_http_request("GET", "/calendar", 200, 0.1);
        record_page_render("/news", true);
        record_revalidation("/news");
        record_admin_mutation("events", "delete");
        record_analytics_events(3);
        record_chat_message();
    }

    #[test]
    fn test_revalidation_label_drops_ids() {
        assert_eq!(path_section("/events/7"), "/events");
        assert_eq!(path_section("/tracks/12"), "/tracks");
        assert_eq!(path_section("/news"), "/news");
        assert_eq!(path_section("/"), "/");
    }
}
