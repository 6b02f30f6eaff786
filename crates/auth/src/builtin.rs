//! Canonical built-in permission seed.
//!
//! This is the single table of well-known permission names: the catalog seeds
//! itself from [`modules`], and handlers reference the constants below.

use crate::permission::{PermissionDefinition, PermissionModule};

pub const USERS_MODULE: &str = "Users";
pub const ROLES_MODULE: &str = "Roles";
pub const CLAIMS_MODULE: &str = "Claims";
pub const AUTHENTICATION_MODULE: &str = "Authentication";
pub const SYSTEM_MODULE: &str = "System";

pub mod users {
    pub const VIEW: &str = "Permissions.Users.View";
    pub const CREATE: &str = "Permissions.Users.Create";
    pub const EDIT: &str = "Permissions.Users.Edit";
    pub const DELETE: &str = "Permissions.Users.Delete";
    pub const MANAGE_ROLES: &str = "Permissions.Users.ManageRoles";
    pub const RESET_PASSWORD: &str = "Permissions.Users.ResetPassword";
}

pub mod roles {
    pub const VIEW: &str = "Permissions.Roles.View";
    pub const CREATE: &str = "Permissions.Roles.Create";
    pub const EDIT: &str = "Permissions.Roles.Edit";
    pub const DELETE: &str = "Permissions.Roles.Delete";
    pub const MANAGE_PERMISSIONS: &str = "Permissions.Roles.ManagePermissions";
}

pub mod claims {
    pub const VIEW: &str = "Permissions.Claims.View";
    pub const MANAGE: &str = "Permissions.Claims.Manage";
}

pub mod authentication {
    pub const VIEW_SESSIONS: &str = "Permissions.Authentication.ViewSessions";
    pub const REVOKE_SESSIONS: &str = "Permissions.Authentication.RevokeSessions";
    pub const MANAGE_TOKENS: &str = "Permissions.Authentication.ManageTokens";
}

pub mod system {
    pub const VIEW_SETTINGS: &str = "Permissions.System.ViewSettings";
    pub const MANAGE_SETTINGS: &str = "Permissions.System.ManageSettings";
    pub const VIEW_AUDIT_LOGS: &str = "Permissions.System.ViewAuditLogs";
    pub const VIEW_PERMISSIONS: &str = "Permissions.System.ViewPermissions";
}

struct SeedModule {
    name: &'static str,
    display_name: &'static str,
    description: &'static str,
    sort_order: i32,
    permissions: &'static [SeedPermission],
}

/// `(name, display name, description, group)`
type SeedPermission = (&'static str, &'static str, &'static str, &'static str);

const SEED: &[SeedModule] = &[
    SeedModule {
        name: USERS_MODULE,
        display_name: "User Management",
        description: "Create, edit and deactivate user accounts",
        sort_order: 1,
        permissions: &[
            (users::VIEW, "View Users", "List and inspect user accounts", "Read"),
            (users::CREATE, "Create Users", "Register new user accounts", "Write"),
            (users::EDIT, "Edit Users", "Change user profile data", "Write"),
            (users::DELETE, "Delete Users", "Remove user accounts", "Write"),
            (users::MANAGE_ROLES, "Manage User Roles", "Assign and remove roles", "Administration"),
            (users::RESET_PASSWORD, "Reset Passwords", "Force a password reset", "Administration"),
        ],
    },
    SeedModule {
        name: ROLES_MODULE,
        display_name: "Role Management",
        description: "Define roles and the permissions they carry",
        sort_order: 2,
        permissions: &[
            (roles::VIEW, "View Roles", "List and inspect roles", "Read"),
            (roles::CREATE, "Create Roles", "Define new roles", "Write"),
            (roles::EDIT, "Edit Roles", "Rename and describe roles", "Write"),
            (roles::DELETE, "Delete Roles", "Remove roles", "Write"),
            (
                roles::MANAGE_PERMISSIONS,
                "Manage Role Permissions",
                "Grant and revoke permission claims on roles",
                "Administration",
            ),
        ],
    },
    SeedModule {
        name: CLAIMS_MODULE,
        display_name: "Claim Management",
        description: "Inspect and edit user and role claims",
        sort_order: 3,
        permissions: &[
            (claims::VIEW, "View Claims", "List claims attached to users and roles", "Read"),
            (claims::MANAGE, "Manage Claims", "Add and remove claims", "Administration"),
        ],
    },
    SeedModule {
        name: AUTHENTICATION_MODULE,
        display_name: "Authentication",
        description: "Session and token administration",
        sort_order: 4,
        permissions: &[
            (
                authentication::VIEW_SESSIONS,
                "View Sessions",
                "List active refresh-token sessions",
                "Read",
            ),
            (
                authentication::REVOKE_SESSIONS,
                "Revoke Sessions",
                "Revoke refresh tokens of any user",
                "Administration",
            ),
            (
                authentication::MANAGE_TOKENS,
                "Manage Tokens",
                "Administer token lifetimes and limits",
                "Administration",
            ),
        ],
    },
    SeedModule {
        name: SYSTEM_MODULE,
        display_name: "System Administration",
        description: "System-wide settings and diagnostics",
        sort_order: 5,
        permissions: &[
            (system::VIEW_SETTINGS, "View Settings", "Read system settings", "Read"),
            (system::MANAGE_SETTINGS, "Manage Settings", "Change system settings", "Administration"),
            (system::VIEW_AUDIT_LOGS, "View Audit Logs", "Read the audit trail", "Read"),
            (
                system::VIEW_PERMISSIONS,
                "View Permission Catalog",
                "List registered permissions and modules",
                "Read",
            ),
        ],
    },
];

/// Built-in modules, in seed order.
///
/// Seed entries are static and covered by tests, so an entry failing
/// validation is skipped with an error log rather than aborting start-up.
pub fn modules() -> Vec<PermissionModule> {
    SEED.iter().filter_map(build_module).collect()
}

/// Every built-in permission name.
pub fn permission_names() -> Vec<&'static str> {
    SEED.iter()
        .flat_map(|m| m.permissions.iter().map(|(name, ..)| *name))
        .collect()
}

fn build_module(seed: &SeedModule) -> Option<PermissionModule> {
    let built = seed
        .permissions
        .iter()
        .enumerate()
        .map(|(idx, (name, display_name, description, group))| {
            PermissionDefinition::new(
                *name,
                *display_name,
                seed.name,
                *description,
                idx as i32 + 1,
                *group,
                true,
            )
        })
        .collect::<Result<Vec<_>, _>>()
        .and_then(|permissions| {
            PermissionModule::new(
                seed.name,
                seed.display_name,
                seed.description,
                seed.sort_order,
                permissions,
            )
        });

    match built {
        Ok(module) => Some(module),
        Err(e) => {
            tracing::error!(module = seed.name, "invalid built-in permission module: {e}");
            None
        }
    }
}
