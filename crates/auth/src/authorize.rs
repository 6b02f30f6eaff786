use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use crate::policy::{PolicyResolver, Requirement};

/// Permission claims held by a caller.
///
/// Extracted from the authenticated principal by the transport layer; the
/// evaluator never fetches claims itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionClaims(HashSet<String>);

impl PermissionClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Claims as a sorted list (stable output for responses and logs).
    pub fn sorted(&self) -> Vec<String> {
        let mut all: Vec<_> = self.0.iter().cloned().collect();
        all.sort();
        all
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionClaims {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// Policy name is neither a composite nor a registered permission.
    #[error("unknown policy '{0}'")]
    UnknownPolicy(String),

    /// Permission name is not in the catalog.
    #[error("unknown permission '{0}'")]
    CatalogLookupMiss(String),

    #[error("forbidden: policy '{0}' not satisfied")]
    Forbidden(String),
}

/// Evaluate a requirement against a caller's claims.
///
/// - No IO
/// - No panics
/// - Empty requirement lists never pass
pub fn evaluate(requirement: &Requirement, claims: &PermissionClaims) -> Decision {
    let allowed = match requirement {
        Requirement::Permission(p) => claims.contains(p),
        Requirement::AnyOf(ps) => ps.iter().any(|p| claims.contains(p)),
        Requirement::AllOf(ps) => !ps.is_empty() && ps.iter().all(|p| claims.contains(p)),
    };

    if allowed { Decision::Allow } else { Decision::Deny }
}

/// Resolves policy names and evaluates them in one step.
#[derive(Debug, Clone)]
pub struct Authorizer {
    resolver: PolicyResolver,
}

impl Authorizer {
    pub fn new(resolver: PolicyResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &PolicyResolver {
        &self.resolver
    }

    /// Check a named policy. Unknown names fail closed.
    pub fn authorize(&self, policy_name: &str, claims: &PermissionClaims) -> Result<(), AuthzError> {
        let requirement = self.resolver.resolve(policy_name).inspect_err(|_| {
            tracing::warn!(policy = policy_name, "authorization requested for unknown policy");
        })?;

        match evaluate(&requirement, claims) {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(AuthzError::Forbidden(policy_name.to_string())),
        }
    }

    /// Check a single permission by name (no composite lookup).
    pub fn check_permission(&self, permission: &str, claims: &PermissionClaims) -> Result<(), AuthzError> {
        if !self.resolver.catalog().is_valid_permission(permission) {
            return Err(AuthzError::CatalogLookupMiss(permission.to_string()));
        }

        match evaluate(&Requirement::Permission(permission.to_string()), claims) {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(AuthzError::Forbidden(permission.to_string())),
        }
    }

    /// Check that every permission is held (defense-in-depth checks).
    pub fn require_all(&self, permissions: &[&str], claims: &PermissionClaims) -> Result<(), AuthzError> {
        if let Some(missing) = permissions
            .iter()
            .find(|p| !self.resolver.catalog().is_valid_permission(p))
        {
            return Err(AuthzError::CatalogLookupMiss(missing.to_string()));
        }

        let requirement = Requirement::AllOf(permissions.iter().map(|p| p.to_string()).collect());
        match evaluate(&requirement, claims) {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(AuthzError::Forbidden(permissions.join(","))),
        }
    }

    /// Explain why a policy check would pass or fail.
    pub fn explain(&self, policy_name: &str, claims: &PermissionClaims) -> AuthorizationExplanation {
        let held = claims.sorted();

        let requirement = match self.resolver.resolve(policy_name) {
            Ok(r) => r,
            Err(e) => {
                return AuthorizationExplanation {
                    policy: policy_name.to_string(),
                    requirement: None,
                    decision: Decision::Deny,
                    reason: e.to_string(),
                    matched_permissions: Vec::new(),
                    missing_permissions: Vec::new(),
                    held_permissions: held,
                };
            }
        };

        let required = requirement.permissions();
        let matched: Vec<String> = required
            .iter()
            .filter(|p| claims.contains(p))
            .map(|p| p.to_string())
            .collect();
        let missing: Vec<String> = required
            .iter()
            .filter(|p| !claims.contains(p))
            .map(|p| p.to_string())
            .collect();

        let decision = evaluate(&requirement, claims);
        let reason = match (&requirement, decision) {
            (_, Decision::Allow) if matched.len() == 1 => {
                format!("caller holds '{}'", matched[0])
            }
            (_, Decision::Allow) => format!("caller holds {} qualifying permissions", matched.len()),
            (Requirement::AnyOf(ps), Decision::Deny) if ps.is_empty() => {
                "policy covers no registered permissions".to_string()
            }
            (Requirement::Permission(p), Decision::Deny) => format!("missing required permission '{p}'"),
            (Requirement::AnyOf(_), Decision::Deny) => {
                "caller holds none of the qualifying permissions".to_string()
            }
            (Requirement::AllOf(_), Decision::Deny) => {
                format!("missing {} of the required permissions", missing.len())
            }
        };

        AuthorizationExplanation {
            policy: policy_name.to_string(),
            requirement: Some(requirement),
            decision,
            reason,
            matched_permissions: matched,
            missing_permissions: missing,
            held_permissions: held,
        }
    }
}

/// Auditable account of a policy decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub policy: String,
    /// `None` when the policy name could not be resolved.
    pub requirement: Option<Requirement>,
    pub decision: Decision,
    pub reason: String,
    pub matched_permissions: Vec<String>,
    pub missing_permissions: Vec<String>,
    pub held_permissions: Vec<String>,
}
