//! Permission catalog browsing and authorization debugging.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
};

use keyward_auth::builtin::system;
use keyward_auth::policy::names;

use crate::app::dto::ExplainQuery;
use crate::app::{errors, services::AppServices};
use crate::authz;
use crate::context::PrincipalContext;

/// GET /permissions - every registered permission
pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(denied) = authz::require_permission(&services.authorizer, &principal, system::VIEW_PERMISSIONS) {
        return denied;
    }

    let permissions = services.authorizer.resolver().catalog().all_permissions();
    (StatusCode::OK, Json(serde_json::json!({ "permissions": permissions }))).into_response()
}

/// GET /permissions/modules - open to anyone holding a System permission
pub async fn list_modules(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(denied) = authz::require_policy(&services.authorizer, &principal, names::SYSTEM_ADMINISTRATION) {
        return denied;
    }

    let modules = services.authorizer.resolver().catalog().modules();
    (StatusCode::OK, Json(serde_json::json!({ "modules": modules }))).into_response()
}

/// GET /permissions/modules/:name - one module with its permissions
pub async fn get_module(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(name): Path<String>,
) -> axum::response::Response {
    if let Err(denied) = authz::require_permission(&services.authorizer, &principal, system::VIEW_PERMISSIONS) {
        return denied;
    }

    let catalog = services.authorizer.resolver().catalog();
    match catalog.get_module(&name) {
        Some(module) => {
            let permissions = catalog.module_permissions(&name);
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "name": module.name(),
                    "display_name": module.display_name(),
                    "description": module.description(),
                    "sort_order": module.sort_order(),
                    "permissions": permissions,
                })),
            )
                .into_response()
        }
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "module not found"),
    }
}

/// GET /authz/explain?policy= - how a policy check would go for the caller
pub async fn explain(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ExplainQuery>,
) -> axum::response::Response {
    let explanation = services
        .authorizer
        .explain(&query.policy, principal.permissions());
    (StatusCode::OK, Json(explanation)).into_response()
}

/// GET /authz/check?policy= - 204 when the caller satisfies the policy, 403 otherwise
pub async fn check(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ExplainQuery>,
) -> axum::response::Response {
    match authz::require_policy(&services.authorizer, &principal, &query.policy) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(denied) => denied,
    }
}
