//! Handler-side authorization guards.
//!
//! Every failure, unknown policy names included, is a 403 with a fixed
//! message; the reason only goes to the log.

use axum::http::StatusCode;
use axum::response::Response;

use keyward_auth::{Authorizer, AuthzError};

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

/// Require a named policy (composite or single permission).
pub fn require_policy(
    authorizer: &Authorizer,
    principal: &PrincipalContext,
    policy: &str,
) -> Result<(), Response> {
    authorizer
        .authorize(policy, principal.permissions())
        .map_err(|e| forbidden(principal, e))
}

/// Require one specific catalog permission.
pub fn require_permission(
    authorizer: &Authorizer,
    principal: &PrincipalContext,
    permission: &str,
) -> Result<(), Response> {
    authorizer
        .check_permission(permission, principal.permissions())
        .map_err(|e| forbidden(principal, e))
}

fn forbidden(principal: &PrincipalContext, err: AuthzError) -> Response {
    tracing::info!(user_id = %principal.user_id(), reason = %err, "request forbidden");
    json_error(StatusCode::FORBIDDEN, "forbidden", "insufficient permissions")
}
