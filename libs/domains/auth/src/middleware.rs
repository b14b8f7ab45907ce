use crate::validator::TokenValidator;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_helpers::AppError;

/// Extract the bearer token from the Authorization header.
fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer ").map(|s| s.to_string()))
}

/// Authentication middleware.
///
/// Validates the bearer token (signature, expiry, revocation list) and
/// inserts the [`crate::Claims`] into request extensions on success.
///
/// # Example
///
/// ```ignore
/// let protected = Router::new()
///     .route("/notifications/send", post(send))
///     .layer(axum::middleware::from_fn_with_state(
///         validator.clone(),
///         domain_auth::require_auth,
///     ));
/// ```
pub async fn require_auth(
    State(validator): State<TokenValidator>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = match extract_bearer(&headers) {
        Some(token) => token,
        None => {
            tracing::debug!("No bearer token in Authorization header");
            return Err(AppError::Unauthorized("No token provided".to_string()).into_response());
        }
    };

    let claims = validator.validate(&token).await.map_err(|_| {
        AppError::Unauthorized("Invalid or revoked token".to_string()).into_response()
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(extract_bearer(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_bearer_missing_or_malformed() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);
    }
}
