//! Service wiring: stores, catalog, authorizer and session manager.

use std::sync::Arc;

use anyhow::Context;

use keyward_auth::{
    Authorizer, PermissionCatalog, PolicyResolver, RefreshTokenStore, Role, RolePermissionSource,
    SessionManager, TokenIssuer, UserStore,
};
use keyward_infra::{
    AppConfig, InMemoryRefreshTokenStore, InMemoryRolePermissions, InMemoryUserStore, NewUser,
    PostgresRefreshTokenStore, load_permission_modules,
};

pub struct AppServices {
    pub sessions: SessionManager,
    pub authorizer: Authorizer,
    pub role_permissions: Arc<dyn RolePermissionSource>,
}

/// Production wiring: in-memory accounts (optionally seeded with an admin),
/// Postgres refresh tokens when `DATABASE_URL` is set.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let users = Arc::new(InMemoryUserStore::new());
    if let Some(admin) = &config.bootstrap_admin {
        let account = users
            .add_user(NewUser {
                credential_id: &admin.email,
                display_name: "Administrator",
                password: &admin.password,
                roles: vec![Role::ADMINISTRATOR],
            })
            .context("seeding bootstrap administrator")?;
        tracing::info!(user_id = %account.id, "bootstrap administrator created");
    }

    let tokens: Arc<dyn RefreshTokenStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresRefreshTokenStore::connect(url)
                .await
                .context("connecting refresh-token store")?;
            tracing::info!("refresh tokens persisted in postgres");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; refresh tokens are kept in memory");
            Arc::new(InMemoryRefreshTokenStore::new())
        }
    };

    assemble(
        config,
        users,
        tokens,
        Arc::new(InMemoryRolePermissions::with_defaults()),
    )
}

/// Wire services over the given collaborators.
pub fn assemble(
    config: &AppConfig,
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn RefreshTokenStore>,
    role_permissions: Arc<dyn RolePermissionSource>,
) -> anyhow::Result<AppServices> {
    let catalog = Arc::new(PermissionCatalog::with_builtin());
    if let Some(path) = &config.permission_modules_path {
        for module in load_permission_modules(path)? {
            tracing::info!(module = module.name(), "registering configured permission module");
            catalog.register_module(module);
        }
    }
    tracing::info!(permissions = catalog.len(), "permission catalog ready");

    let sessions = SessionManager::new(
        users,
        tokens,
        TokenIssuer::new(config.tokens.clone()),
        config.max_active_refresh_tokens,
    );

    Ok(AppServices {
        sessions,
        authorizer: Authorizer::new(PolicyResolver::new(catalog)),
        role_permissions,
    })
}
