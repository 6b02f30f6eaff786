//! Process-wide permission catalog.
//!
//! Registrars (the built-in seed, then externally configured modules) write
//! into the catalog at start-up; every authorization check reads from it
//! afterwards. Callers never lock: the catalog guards its own state.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::builtin;
use crate::permission::{PermissionDefinition, PermissionModule};

#[derive(Debug, Default)]
struct CatalogState {
    permissions: HashMap<String, PermissionDefinition>,
    /// Keyed by lower-cased module name. A module entry lists exactly the
    /// permissions whose definition names that module.
    modules: HashMap<String, PermissionModule>,
}

impl CatalogState {
    /// Store a definition by name. A permission that moves to another module
    /// is dropped from its previous module entry.
    fn put_permission(&mut self, permission: PermissionDefinition) {
        let Some(previous) = self
            .permissions
            .insert(permission.name().to_string(), permission.clone())
        else {
            return;
        };
        if previous.belongs_to(permission.module()) {
            return;
        }
        if let Some(old_module) = self.modules.get_mut(&previous.module().to_lowercase()) {
            old_module.remove_permission(previous.name());
        }
    }
}

/// Thread-safe registry of permission definitions grouped into modules.
///
/// The catalog only grows or overwrites; there is no removal. A module is
/// registered under a single write, so readers never observe half of it.
#[derive(Debug, Default)]
pub struct PermissionCatalog {
    state: RwLock<CatalogState>,
}

impl PermissionCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with the built-in seed.
    pub fn with_builtin() -> Self {
        let catalog = Self::new();
        for module in builtin::modules() {
            catalog.register_module(module);
        }
        catalog
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upsert a module and all of its permissions. Last writer wins per name.
    ///
    /// Permissions already registered under the module but missing from
    /// `module` stay registered and stay listed under it.
    pub fn register_module(&self, mut module: PermissionModule) {
        let key = module.name().to_lowercase();

        let mut state = self.write();
        if let Some(previous) = state.modules.remove(&key) {
            for permission in previous.into_permissions() {
                if !module.permissions().contains(&permission) {
                    module.upsert_permission(permission);
                }
            }
        }
        for permission in module.permissions() {
            state.put_permission(permission.clone());
        }
        tracing::debug!(
            module = module.name(),
            permissions = module.permissions().len(),
            "permission module registered"
        );
        state.modules.insert(key, module);
    }

    /// Upsert a single permission, creating its module entry when missing.
    pub fn register_permission(&self, permission: PermissionDefinition) {
        let key = permission.module().to_lowercase();

        let mut state = self.write();
        state.put_permission(permission.clone());
        state
            .modules
            .entry(key)
            .or_insert_with(|| PermissionModule::implicit(permission.module()))
            .upsert_permission(permission);
    }

    pub fn get_permission(&self, name: &str) -> Option<PermissionDefinition> {
        self.read().permissions.get(name).cloned()
    }

    pub fn is_valid_permission(&self, name: &str) -> bool {
        self.read().permissions.contains_key(name)
    }

    /// Every permission, sorted by `(module, sort_order, display_name)`.
    pub fn all_permissions(&self) -> Vec<PermissionDefinition> {
        let mut all: Vec<_> = self.read().permissions.values().cloned().collect();
        all.sort_by(listing_order);
        all
    }

    /// Permissions of one module (case-insensitive), in listing order.
    pub fn module_permissions(&self, module: &str) -> Vec<PermissionDefinition> {
        let mut listed = self
            .read()
            .modules
            .get(&module.to_lowercase())
            .map(|m| m.permissions().to_vec())
            .unwrap_or_default();
        listed.sort_by(listing_order);
        listed
    }

    pub fn get_module(&self, name: &str) -> Option<PermissionModule> {
        self.read().modules.get(&name.to_lowercase()).cloned()
    }

    /// Registered modules, sorted by `(sort_order, name)`.
    pub fn modules(&self) -> Vec<PermissionModule> {
        let mut modules: Vec<_> = self.read().modules.values().cloned().collect();
        modules.sort_by(|a, b| {
            a.sort_order()
                .cmp(&b.sort_order())
                .then_with(|| a.name().cmp(b.name()))
        });
        modules
    }

    pub fn len(&self) -> usize {
        self.read().permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn listing_order(a: &PermissionDefinition, b: &PermissionDefinition) -> Ordering {
    a.module()
        .cmp(b.module())
        .then_with(|| a.sort_order().cmp(&b.sort_order()))
        .then_with(|| a.display_name().cmp(b.display_name()))
        .then_with(|| a.name().cmp(b.name()))
}
