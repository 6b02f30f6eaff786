//! Permission definitions and the modules that own them.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use keyward_core::{DomainError, DomainResult};

/// A single grantable permission (e.g. `Permissions.Users.View`).
///
/// Immutable once built. Two definitions are equal when their names are equal,
/// whatever their display metadata says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionDefinition {
    name: String,
    display_name: String,
    module: String,
    description: String,
    sort_order: i32,
    group: String,
    is_system_permission: bool,
}

impl PermissionDefinition {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        module: impl Into<String>,
        description: impl Into<String>,
        sort_order: i32,
        group: impl Into<String>,
        is_system_permission: bool,
    ) -> DomainResult<Self> {
        let definition = Self {
            name: name.into(),
            display_name: display_name.into(),
            module: module.into(),
            description: description.into(),
            sort_order,
            group: group.into(),
            is_system_permission,
        };
        definition.validate()?;
        Ok(definition)
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("permission name must not be empty"));
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(DomainError::validation(format!(
                "permission name '{}' must not contain whitespace",
                self.name
            )));
        }
        if self.module.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "permission '{}' has no module",
                self.name
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name, falling back to the permission name when none was given.
    pub fn display_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn sort_order(&self) -> i32 {
        self.sort_order
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn is_system_permission(&self) -> bool {
        self.is_system_permission
    }

    pub(crate) fn belongs_to(&self, module: &str) -> bool {
        self.module.eq_ignore_ascii_case(module)
    }
}

impl PartialEq for PermissionDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for PermissionDefinition {}

impl Hash for PermissionDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A named group of permissions, registered into the catalog as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionModule {
    name: String,
    display_name: String,
    description: String,
    sort_order: i32,
    permissions: Vec<PermissionDefinition>,
}

impl PermissionModule {
    /// Build a module from its permissions.
    ///
    /// Every permission must name this module, and names must be unique
    /// within the module. Insertion order is preserved.
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        sort_order: i32,
        permissions: Vec<PermissionDefinition>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("module name must not be empty"));
        }

        for (idx, permission) in permissions.iter().enumerate() {
            if !permission.belongs_to(&name) {
                return Err(DomainError::validation(format!(
                    "permission '{}' declares module '{}' but is registered under '{}'",
                    permission.name, permission.module, name
                )));
            }
            if permissions[..idx].contains(permission) {
                return Err(DomainError::validation(format!(
                    "duplicate permission '{}' in module '{}'",
                    permission.name, name
                )));
            }
        }

        Ok(Self {
            name,
            display_name: display_name.into(),
            description: description.into(),
            sort_order,
            permissions,
        })
    }

    /// Placeholder module for a permission registered on its own.
    pub(crate) fn implicit(name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: name.to_string(),
            description: String::new(),
            sort_order: i32::MAX,
            permissions: Vec::new(),
        }
    }

    pub(crate) fn upsert_permission(&mut self, permission: PermissionDefinition) {
        match self.permissions.iter_mut().find(|p| **p == permission) {
            Some(existing) => *existing = permission,
            None => self.permissions.push(permission),
        }
    }

    pub(crate) fn remove_permission(&mut self, name: &str) {
        self.permissions.retain(|p| p.name() != name);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn sort_order(&self) -> i32 {
        self.sort_order
    }

    pub fn permissions(&self) -> &[PermissionDefinition] {
        &self.permissions
    }

    pub fn into_permissions(self) -> Vec<PermissionDefinition> {
        self.permissions
    }
}
