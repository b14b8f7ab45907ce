use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_helpers::{ApiResponse, AppError, ValidatedJson};
use domain_auth::Claims;
use domain_notifications::SendNotificationRequest;
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/notifications/send", post(send))
        .route("/notifications/status/{id}", get(status))
        .layer(axum::middleware::from_fn_with_state(
            state.validator.clone(),
            domain_auth::require_auth,
        ))
        .with_state(state)
}

fn idempotency_key(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("x-idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            AppError::Validation("X-Idempotency-Key header is required".to_string())
        })
}

async fn send(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<SendNotificationRequest>,
) -> Result<Response, AppError> {
    let key = idempotency_key(&headers)?;

    let user_id: Uuid = claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Malformed token subject".to_string()))?;

    // Admission control runs before any side effect, the idempotency
    // reservation included
    state.rate_limiter.check(&claims.sub).await?;

    let receipt = state
        .dispatch
        .dispatch(user_id, &claims.email, &key, request)
        .await?;

    Ok(Json(ApiResponse::success(receipt, "Notification queued")).into_response())
}

async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let record = state
        .dispatch
        .status_of(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No status record for '{}'", id)))?;

    Ok(Json(ApiResponse::success(record, "Status retrieved")).into_response())
}
