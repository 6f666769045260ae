//! 客户端埋点接收

use axum::{Json, extract::rejection::JsonRejection, http::StatusCode};
use kart_shared::observability::metrics;
use tracing::info;
use validator::Validate;

use crate::dto::{AcceptedResponse, AnalyticsBatch};
use crate::error::{Result, SiteError};

/// 批量接收埋点事件，逐条写入结构化日志
///
/// POST /api/analytics
pub async fn collect(
    body: std::result::Result<Json<AnalyticsBatch>, JsonRejection>,
) -> Result<(StatusCode, Json<AcceptedResponse>)> {
    let Json(batch) = body.map_err(|e| SiteError::Validation(e.body_text()))?;
    batch.validate()?;

    for event in &batch.events {
        let properties = serde_json::to_string(&event.properties)?;
        info!(
            target: "analytics",
            event_name = %event.name,
            path = event.path.as_deref().unwrap_or(""),
            timestamp = ?event.timestamp,
            properties = %properties,
            "Analytics event"
        );
    }

    let accepted = batch.events.len();
    metrics::record_analytics_events(accepted);

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            success: true,
            accepted,
        }),
    ))
}
