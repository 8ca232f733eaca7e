use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing::get};

use crate::HealthResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Liveness probe. The safeguards are only as healthy as the store backing
/// the counters and the job table, so the probe runs one round trip against
/// it and reports the active throttle enforcement mode alongside.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Store reachable, safeguards active", body = HealthResponse),
        (status = 503, description = "Store unreachable, limiter failing open", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .is_ok();

    let (http_status, status) = health_status(store_ok);
    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            enforcement: state.enforcement.as_str().to_string(),
        }),
    )
}

/// A down store means rate limiting is failing open and audit writes are
/// being dropped; report degraded so operators see it before users do.
fn health_status(store_ok: bool) -> (StatusCode, &'static str) {
    if store_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_reachability_maps_to_status() {
        assert_eq!(health_status(true), (StatusCode::OK, "ok"));
        assert_eq!(
            health_status(false),
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        );
    }
}
