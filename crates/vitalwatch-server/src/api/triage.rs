use crate::api::{error_response, success_response, ApiError};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};
use vitalwatch_common::types::{AlertRecord, BatchContext, Severity};
use vitalwatch_notify::error::DispatchError;
use vitalwatch_storage::DispatchLogRow;

const DEFAULT_PAGE_LIMIT: usize = 50;
const MAX_PAGE_LIMIT: usize = 500;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct ListBatchesParams {
    /// Default 50, max 500
    #[param(required = false)]
    limit: Option<usize>,
    #[param(required = false)]
    offset: Option<usize>,
}

/// Ingested batches, newest first. Ids feed `batchId` on the alert list.
#[utoipa::path(
    get,
    path = "/api/triage/batches",
    tag = "Triage",
    security(("bearer_auth" = [])),
    params(ListBatchesParams),
    responses(
        (status = 200, description = "Batches", body = Vec<BatchContext>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 500, description = "Store unavailable", body = ApiError)
    )
)]
async fn list_batches(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListBatchesParams>,
) -> impl IntoResponse {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let offset = params.offset.unwrap_or(0);
    match state.service.store().list_batches(limit, offset).await {
        Ok(batches) => success_response(StatusCode::OK, &trace_id, batches),
        Err(e) => {
            tracing::error!(trace_id = %*trace_id, error = %e, "Failed to list batches");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "Failed to load batches",
            )
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
struct ListAlertsParams {
    /// Batch to triage; defaults to the most recently ingested batch
    #[param(required = false)]
    batch_id: Option<String>,
}

/// Triaged alerts for one batch, red first, one per patient.
#[utoipa::path(
    get,
    path = "/api/triage/alerts",
    tag = "Triage",
    security(("bearer_auth" = [])),
    params(ListAlertsParams),
    responses(
        (status = 200, description = "Alert set sorted by severity", body = Vec<AlertRecord>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 500, description = "Store unavailable", body = ApiError)
    )
)]
async fn list_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListAlertsParams>,
) -> impl IntoResponse {
    let batch_id = params
        .batch_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    match state.service.list_alerts(batch_id).await {
        Ok(alerts) => success_response(StatusCode::OK, &trace_id, alerts),
        Err(e) => {
            tracing::error!(trace_id = %*trace_id, error = %e, "Failed to build alert set");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "Failed to load alerts",
            )
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendAlertRequest {
    #[serde(default)]
    pub alert_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendAlertResponse {
    pub success: bool,
    pub patient_name: String,
    /// The text that was delivered
    pub message: String,
    /// Message id assigned by the notification channel
    pub message_id: String,
    /// The same alert went out recently and was not re-sent
    pub suppressed: bool,
    #[serde(rename = "trace_id")]
    pub trace_id: String,
}

fn dispatch_error_response(trace_id: &str, err: &DispatchError) -> Response {
    let status = match err {
        DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
        DispatchError::Configuration(_)
        | DispatchError::Channel(_)
        | DispatchError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, trace_id, &err.to_string())
}

/// Sends one alert to the configured destination.
#[utoipa::path(
    post,
    path = "/api/triage/send-alert",
    tag = "Triage",
    security(("bearer_auth" = [])),
    request_body = SendAlertRequest,
    responses(
        (status = 200, description = "Alert sent", body = SendAlertResponse),
        (status = 400, description = "alertId missing", body = ApiError),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 404, description = "Unknown alert id", body = ApiError),
        (status = 500, description = "Configuration or channel error", body = ApiError)
    )
)]
async fn send_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    payload: Result<Json<SendAlertRequest>, JsonRejection>,
) -> impl IntoResponse {
    let alert_id = payload
        .ok()
        .and_then(|Json(req)| req.alert_id)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let Some(alert_id) = alert_id else {
        return error_response(StatusCode::BAD_REQUEST, &trace_id, "alertId is required");
    };

    match state.dispatcher.send_alert(&alert_id).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(SendAlertResponse {
                success: true,
                patient_name: receipt.patient_name,
                message: receipt.message,
                message_id: receipt.channel_message_id,
                suppressed: receipt.suppressed,
                trace_id: trace_id.to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(trace_id = %*trace_id, alert_id = %alert_id, error = %e, "Send alert failed");
            dispatch_error_response(&trace_id, &e)
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendAlertsRequest {
    #[serde(default)]
    pub alert_ids: Option<Vec<String>>,
}

#[derive(Serialize, ToSchema)]
pub struct SendAlertsResponse {
    pub success: bool,
    /// Alerts delivered; failures are skipped, not reported
    pub sent: usize,
    pub message: String,
    pub trace_id: String,
}

/// Sends several alerts one at a time. Individual failures do not fail the request.
#[utoipa::path(
    post,
    path = "/api/triage/send-alerts",
    tag = "Triage",
    security(("bearer_auth" = [])),
    request_body = SendAlertsRequest,
    responses(
        (status = 200, description = "Bulk send finished", body = SendAlertsResponse),
        (status = 400, description = "alertIds missing or empty", body = ApiError),
        (status = 401, description = "Not authenticated", body = ApiError)
    )
)]
async fn send_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    payload: Result<Json<SendAlertsRequest>, JsonRejection>,
) -> impl IntoResponse {
    let alert_ids = payload
        .ok()
        .and_then(|Json(req)| req.alert_ids)
        .unwrap_or_default();
    if alert_ids.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "alertIds must be a non-empty list",
        );
    }

    let sent = state.dispatcher.send_all_alerts(&alert_ids).await;
    (
        StatusCode::OK,
        Json(SendAlertsResponse {
            success: true,
            sent,
            message: format!("Sent {sent} of {} alerts", alert_ids.len()),
            trace_id: trace_id.to_string(),
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
struct ListDispatchesParams {
    #[param(required = false)]
    patient_id: Option<String>,
    #[param(required = false)]
    batch_id: Option<String>,
    /// Default 50, max 500
    #[param(required = false)]
    limit: Option<usize>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchLogResponse {
    pub id: String,
    pub alert_id: String,
    pub patient_id: String,
    pub batch_id: String,
    pub severity: Severity,
    pub destination: String,
    pub channel_type: String,
    /// `sent`, `failed` or `suppressed`
    pub status: String,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DispatchLogRow> for DispatchLogResponse {
    fn from(row: DispatchLogRow) -> Self {
        Self {
            id: row.id,
            alert_id: row.alert_id,
            patient_id: row.patient_id,
            batch_id: row.batch_id,
            severity: row.severity,
            destination: row.destination,
            channel_type: row.channel_type,
            status: row.status.to_string(),
            message_id: row.channel_message_id,
            error: row.error,
            created_at: row.created_at,
        }
    }
}

/// Dispatch history, newest first.
#[utoipa::path(
    get,
    path = "/api/triage/dispatches",
    tag = "Triage",
    security(("bearer_auth" = [])),
    params(ListDispatchesParams),
    responses(
        (status = 200, description = "Dispatch attempts", body = Vec<DispatchLogResponse>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 500, description = "Store unavailable", body = ApiError)
    )
)]
async fn list_dispatches(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListDispatchesParams>,
) -> impl IntoResponse {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    match state
        .service
        .store()
        .list_dispatches(params.patient_id.as_deref(), params.batch_id.as_deref(), limit)
        .await
    {
        Ok(rows) => {
            let items: Vec<DispatchLogResponse> = rows.into_iter().map(Into::into).collect();
            success_response(StatusCode::OK, &trace_id, items)
        }
        Err(e) => {
            tracing::error!(trace_id = %*trace_id, error = %e, "Failed to list dispatches");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "Failed to load dispatch history",
            )
        }
    }
}

pub fn triage_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_batches))
        .routes(routes!(list_alerts))
        .routes(routes!(send_alert))
        .routes(routes!(send_alerts))
        .routes(routes!(list_dispatches))
}
