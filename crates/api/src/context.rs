use keyward_auth::{PermissionClaims, Role};
use keyward_core::UserId;

/// Authenticated caller of the current request.
///
/// Built by the auth middleware from a validated access token; permission
/// claims are resolved from the caller's roles on every request.
#[derive(Debug, Clone)]
pub struct PrincipalContext {
    user_id: UserId,
    token_id: String,
    roles: Vec<Role>,
    permissions: PermissionClaims,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, token_id: String, roles: Vec<Role>, permissions: PermissionClaims) -> Self {
        Self {
            user_id,
            token_id,
            roles,
            permissions,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// `jti` of the access token that authenticated the request.
    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn permissions(&self) -> &PermissionClaims {
        &self.permissions
    }
}
