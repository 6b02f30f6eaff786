//! Policy-name resolution.
//!
//! Endpoints name a policy; the resolver turns that name into a
//! [`Requirement`] at check time. Composite policies are expanded against the
//! live catalog on every call, so permissions registered after start-up are
//! covered without any refresh step.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::authorize::AuthzError;
use crate::builtin;
use crate::catalog::PermissionCatalog;

/// Well-known composite policy names.
pub mod names {
    pub const ADMIN_ONLY: &str = "AdminOnly";
    pub const USER_MANAGEMENT: &str = "UserManagement";
    pub const ROLE_MANAGEMENT: &str = "RoleManagement";
    pub const SYSTEM_ADMINISTRATION: &str = "SystemAdministration";
    pub const AUTHENTICATION_MANAGEMENT: &str = "AuthenticationManagement";
}

/// What a caller's permission claims must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Requirement {
    /// Caller must hold exactly this permission.
    Permission(String),
    /// Caller must hold at least one of these (fails closed when empty).
    AnyOf(Vec<String>),
    /// Caller must hold all of these (fails closed when empty).
    AllOf(Vec<String>),
}

impl Requirement {
    pub fn permissions(&self) -> Vec<&str> {
        match self {
            Requirement::Permission(p) => vec![p.as_str()],
            Requirement::AnyOf(ps) | Requirement::AllOf(ps) => ps.iter().map(String::as_str).collect(),
        }
    }
}

/// "Any permission from these modules."
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositePolicy {
    name: String,
    modules: Vec<String>,
}

impl CompositePolicy {
    pub fn new(name: impl Into<String>, modules: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            modules: modules.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// The composites every deployment knows about.
    pub fn well_known() -> Vec<Self> {
        vec![
            Self::new(
                names::ADMIN_ONLY,
                [
                    builtin::USERS_MODULE,
                    builtin::ROLES_MODULE,
                    builtin::CLAIMS_MODULE,
                    builtin::AUTHENTICATION_MODULE,
                    builtin::SYSTEM_MODULE,
                ],
            ),
            Self::new(names::USER_MANAGEMENT, [builtin::USERS_MODULE]),
            Self::new(names::ROLE_MANAGEMENT, [builtin::ROLES_MODULE, builtin::CLAIMS_MODULE]),
            Self::new(names::SYSTEM_ADMINISTRATION, [builtin::SYSTEM_MODULE]),
            Self::new(names::AUTHENTICATION_MANAGEMENT, [builtin::AUTHENTICATION_MODULE]),
        ]
    }
}

/// Resolves policy names against the catalog.
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    catalog: Arc<PermissionCatalog>,
    composites: HashMap<String, CompositePolicy>,
}

impl PolicyResolver {
    /// Resolver with the well-known composites.
    pub fn new(catalog: Arc<PermissionCatalog>) -> Self {
        let resolver = Self {
            catalog,
            composites: HashMap::new(),
        };
        CompositePolicy::well_known()
            .into_iter()
            .fold(resolver, Self::with_composite)
    }

    /// Add (or replace) a composite policy.
    pub fn with_composite(mut self, policy: CompositePolicy) -> Self {
        self.composites.insert(policy.name.clone(), policy);
        self
    }

    pub fn catalog(&self) -> &Arc<PermissionCatalog> {
        &self.catalog
    }

    pub fn composite(&self, name: &str) -> Option<&CompositePolicy> {
        self.composites.get(name)
    }

    /// Composite policy names, sorted.
    pub fn composite_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.composites.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a policy name.
    ///
    /// Composite names win over permission names; anything else is
    /// [`AuthzError::UnknownPolicy`].
    pub fn resolve(&self, policy_name: &str) -> Result<Requirement, AuthzError> {
        if let Some(composite) = self.composites.get(policy_name) {
            return Ok(Requirement::AnyOf(self.expand(composite)));
        }

        if self.catalog.is_valid_permission(policy_name) {
            return Ok(Requirement::Permission(policy_name.to_string()));
        }

        Err(AuthzError::UnknownPolicy(policy_name.to_string()))
    }

    fn expand(&self, composite: &CompositePolicy) -> Vec<String> {
        let mut permissions: Vec<String> = Vec::new();
        for module in &composite.modules {
            for p in self.catalog.module_permissions(module) {
                if !permissions.iter().any(|existing| existing == p.name()) {
                    permissions.push(p.name().to_string());
                }
            }
        }
        permissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::PermissionDefinition;

    fn resolver() -> PolicyResolver {
        PolicyResolver::new(Arc::new(PermissionCatalog::with_builtin()))
    }

    #[test]
    fn registered_permission_resolves_directly() {
        let r = resolver();
        assert_eq!(
            r.resolve(builtin::users::VIEW).unwrap(),
            Requirement::Permission(builtin::users::VIEW.to_string())
        );
    }

    #[test]
    fn composite_expands_to_module_permissions() {
        let r = resolver();
        let Requirement::AnyOf(perms) = r.resolve(names::USER_MANAGEMENT).unwrap() else {
            panic!("expected any-of requirement");
        };
        assert!(perms.contains(&builtin::users::VIEW.to_string()));
        assert!(perms.iter().all(|p| p.starts_with("Permissions.Users.")));
    }

    #[test]
    fn admin_only_covers_every_builtin_permission() {
        let r = resolver();
        let Requirement::AnyOf(perms) = r.resolve(names::ADMIN_ONLY).unwrap() else {
            panic!("expected any-of requirement");
        };
        assert_eq!(perms.len(), builtin::permission_names().len());
    }

    #[test]
    fn unknown_policy_fails_closed() {
        let r = resolver();
        assert_eq!(
            r.resolve("Permissions.Ghost.Read"),
            Err(AuthzError::UnknownPolicy("Permissions.Ghost.Read".to_string()))
        );
    }

    #[test]
    fn composite_tracks_late_registrations() {
        let r = resolver();
        let before = r.resolve(names::SYSTEM_ADMINISTRATION).unwrap().permissions().len();

        r.catalog().register_permission(
            PermissionDefinition::new(
                "Permissions.System.Reindex",
                "Reindex",
                builtin::SYSTEM_MODULE,
                "",
                50,
                "Administration",
                false,
            )
            .unwrap(),
        );

        let after = r.resolve(names::SYSTEM_ADMINISTRATION).unwrap();
        assert_eq!(after.permissions().len(), before + 1);
        assert!(after.permissions().contains(&"Permissions.System.Reindex"));
    }

    #[test]
    fn composite_over_unregistered_module_is_empty() {
        let r = resolver().with_composite(CompositePolicy::new("Reporting", ["Reports"]));
        assert_eq!(r.resolve("Reporting").unwrap(), Requirement::AnyOf(vec![]));
    }

    #[test]
    fn composite_names_are_sorted() {
        let resolver = resolver();
        let names = resolver.composite_names();
        assert_eq!(names.len(), 5);
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }
}
