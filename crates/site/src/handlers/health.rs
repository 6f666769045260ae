//! 存活与就绪探针

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::state::AppState;

const SERVICE_NAME: &str = "kart-site";

/// 存活探针：服务进程正常即返回 ok
///
/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME
    }))
}

/// 就绪探针：检查数据库以及（启用时的）Redis
///
/// GET /ready
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_ok = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    let redis = match &state.cache {
        Some(cache) => Some(cache.health_check().await.is_ok()),
        None => None,
    };
    let all_ok = db_ok && redis.unwrap_or(true);

    let check = |ok: bool| if ok { "ok" } else { "fail" };
    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if all_ok { "ok" } else { "degraded" },
            "service": SERVICE_NAME,
            "checks": {
                "database": check(db_ok),
                "redis": redis.map(check).unwrap_or("disabled")
            }
        })),
    )
}
