//! Role → permission-claim grants.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use keyward_auth::builtin::{self, authentication, system, users};
use keyward_auth::{Role, RolePermissionSource, StoreError};

/// In-memory role grants, keyed by role name (case-insensitive).
#[derive(Debug, Default)]
pub struct InMemoryRolePermissions {
    grants: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl InMemoryRolePermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Administrator` holds every built-in permission; `User` may view users
    /// and its own sessions.
    pub fn with_defaults() -> Self {
        let store = Self::new();
        store.set_role(&Role::ADMINISTRATOR, builtin::permission_names());
        store.set_role(
            &Role::USER,
            [users::VIEW, authentication::VIEW_SESSIONS, system::VIEW_PERMISSIONS],
        );
        store
    }

    /// Replace the role's grants.
    pub fn set_role<I, S>(&self, role: &Role, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = permissions.into_iter().map(Into::into).collect();
        self.grants
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key(role), set);
    }

    pub fn grant(&self, role: &Role, permission: impl Into<String>) {
        self.grants
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(key(role))
            .or_default()
            .insert(permission.into());
    }
}

fn key(role: &Role) -> String {
    role.as_str().to_ascii_lowercase()
}

#[async_trait]
impl RolePermissionSource for InMemoryRolePermissions {
    async fn permissions_for_roles(&self, roles: &[Role]) -> Result<Vec<String>, StoreError> {
        let grants = self
            .grants
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let merged: BTreeSet<&String> = roles
            .iter()
            .filter_map(|role| grants.get(&key(role)))
            .flatten()
            .collect();
        Ok(merged.into_iter().cloned().collect())
    }
}
