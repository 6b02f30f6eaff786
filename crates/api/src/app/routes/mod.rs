use axum::{
    Router,
    routing::{get, post},
};

pub mod auth;
pub mod permissions;
pub mod system;

/// Endpoints reachable without an access token.
pub fn public_router() -> Router {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
}

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/sessions", get(auth::list_sessions))
        .route("/auth/sessions/revoke", post(auth::revoke_session))
        .route("/permissions", get(permissions::list_permissions))
        .route("/permissions/modules", get(permissions::list_modules))
        .route("/permissions/modules/:name", get(permissions::get_module))
        .route("/authz/explain", get(permissions::explain))
        .route("/authz/check", get(permissions::check))
}
