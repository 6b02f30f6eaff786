//! Session endpoints: login, refresh, logout and session management.

use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use chrono::Utc;

use keyward_auth::Credentials;

use crate::app::dto::{LoginRequest, LogoutResponse, RefreshRequest, RevokeSessionRequest, SessionsResponse};
use crate::app::{errors, services::AppServices};
use crate::context::PrincipalContext;
use crate::middleware::ClientIp;

/// POST /auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    client_ip: ClientIp,
    Json(body): Json<LoginRequest>,
) -> axum::response::Response {
    let credentials = Credentials {
        credential_id: body.credential_id,
        password: body.password,
    };

    match services
        .sessions
        .login(&credentials, client_ip.as_deref(), Utc::now())
        .await
    {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /auth/refresh
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    client_ip: ClientIp,
    Json(body): Json<RefreshRequest>,
) -> axum::response::Response {
    match services
        .sessions
        .refresh(
            &body.access_token,
            &body.refresh_token,
            client_ip.as_deref(),
            Utc::now(),
        )
        .await
    {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /auth/logout - revoke every session of the caller
pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    client_ip: ClientIp,
) -> axum::response::Response {
    match services
        .sessions
        .logout(principal.user_id(), client_ip.as_deref(), Utc::now())
        .await
    {
        Ok(revoked) => (StatusCode::OK, Json(LogoutResponse { revoked })).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// GET /auth/sessions - the caller's active sessions, oldest first
pub async fn list_sessions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services
        .sessions
        .active_sessions(principal.user_id(), Utc::now())
        .await
    {
        Ok(sessions) => (StatusCode::OK, Json(SessionsResponse { sessions })).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /auth/sessions/revoke - revoke one of the caller's sessions
pub async fn revoke_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    client_ip: ClientIp,
    Json(body): Json<RevokeSessionRequest>,
) -> axum::response::Response {
    match services
        .sessions
        .revoke_session(
            principal.user_id(),
            &body.refresh_token,
            client_ip.as_deref(),
            Utc::now(),
        )
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}
