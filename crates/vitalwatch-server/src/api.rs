pub mod triage;

use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Error body. Carries only a one-line message, never an error chain.
#[derive(Serialize, ToSchema)]
pub struct ApiError {
    /// Always `false`
    pub success: bool,
    pub message: String,
    pub trace_id: String,
}

/// Success envelope around `data`.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    pub success: bool,
    pub data: T,
    pub trace_id: String,
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            success: true,
            data,
            trace_id: trace_id.to_string(),
        }),
    )
        .into_response()
}

pub fn error_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiError {
            success: false,
            message: msg.to_string(),
            trace_id: trace_id.to_string(),
        }),
    )
        .into_response()
}

#[derive(Serialize, ToSchema)]
struct HealthResponse {
    version: String,
    uptime_secs: i64,
    /// `ok` when the store answers a query
    storage_status: String,
}

/// Service health. No authentication required.
#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let uptime = (Utc::now() - state.start_time).num_seconds();
    let storage_status = match state.service.store().most_recent_batch_id().await {
        Ok(_) => "ok".to_string(),
        Err(e) => {
            tracing::error!(error = %e, "Health check could not query the store");
            "error".to_string()
        }
    };
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: uptime,
            storage_status,
        },
    )
}

pub fn public_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(health))
}

pub fn protected_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().merge(triage::triage_routes())
}
