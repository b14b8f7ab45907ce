use crate::state::AppState;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Extension, Json, Router,
};
use axum_helpers::{ApiResponse, AppError, ValidatedJson};
use chrono::{TimeZone, Utc};
use domain_auth::Claims;
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .layer(axum::middleware::from_fn_with_state(
            state.validator.clone(),
            domain_auth::require_auth,
        ));

    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/validate", post(validate))
        .merge(protected)
        .with_state(state)
}

#[derive(Debug, Deserialize, Validate)]
struct LoginRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1))]
    password: String,
}

#[derive(Debug, Deserialize, Validate)]
struct RefreshRequest {
    #[validate(length(min = 1))]
    refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
struct ValidateRequest {
    #[validate(length(min = 1))]
    token: String,
}

async fn login(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> Result<Response, AppError> {
    let session = state.auth.login(&body.email, &body.password).await?;

    Ok(Json(ApiResponse::success(session, "Login successful")).into_response())
}

async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RefreshRequest>,
) -> Result<Response, AppError> {
    let session = state.auth.refresh(&body.refresh_token).await?;

    Ok(Json(ApiResponse::success(session, "Token refreshed")).into_response())
}

async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, AppError> {
    state.auth.logout(&claims.sub, &claims).await?;

    Ok(Json(ApiResponse::success(
        json!({"success": true}),
        "Logged out",
    ))
    .into_response())
}

/// Token introspection for co-deployed services. Always answers 200;
/// the verdict is in the body.
async fn validate(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<ValidateRequest>,
) -> Result<Response, AppError> {
    match state.auth.validate(&body.token).await {
        Ok(claims) => {
            let expires_at = Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .map(|t| t.to_rfc3339());

            Ok(Json(ApiResponse::success(
                json!({
                    "valid": true,
                    "user_id": claims.sub,
                    "email": claims.email,
                    "expires_at": expires_at,
                }),
                "Token is valid",
            ))
            .into_response())
        }
        Err(_) => Ok(Json(ApiResponse::success(
            json!({
                "valid": false,
                "reason": "invalid, expired, or revoked token",
            }),
            "Token is invalid",
        ))
        .into_response()),
    }
}
