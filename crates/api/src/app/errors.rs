use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use keyward_auth::AuthError;

/// Map a session failure to a response. Internal faults are logged and
/// reported with a generic message.
pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::InvalidCredentials => {
            json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", "invalid credentials")
        }
        AuthError::AccountLocked => json_error(StatusCode::FORBIDDEN, "account_locked", "account is locked"),
        AuthError::AccountInactive => {
            json_error(StatusCode::FORBIDDEN, "account_inactive", "account is inactive")
        }
        AuthError::InvalidOrExpiredRefreshToken => json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_refresh_token",
            "invalid or expired refresh token",
        ),
        AuthError::Token(e) => {
            tracing::error!("token failure: {e}");
            internal_error()
        }
        AuthError::Store(e) => {
            tracing::error!("store failure: {e}");
            internal_error()
        }
    }
}

pub fn internal_error() -> axum::response::Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal server error")
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
