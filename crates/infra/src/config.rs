//! Process configuration, read from the environment.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, ensure};
use chrono::Duration;
use serde::Deserialize;

use keyward_auth::{PermissionDefinition, PermissionModule, TokenSettings};

const DEV_JWT_SECRET: &str = "dev-insecure-secret-change-me";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub tokens: TokenSettings,
    pub max_active_refresh_tokens: usize,
    pub permission_modules_path: Option<PathBuf>,
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Account seeded into the in-memory user store at startup.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret = match var("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using an insecure development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let access_minutes: i64 = parse_or(&var, "ACCESS_TOKEN_TTL_MINUTES", 15)?;
        let refresh_days: i64 = parse_or(&var, "REFRESH_TOKEN_TTL_DAYS", 7)?;
        let max_active: usize = parse_or(&var, "MAX_ACTIVE_REFRESH_TOKENS", 5)?;
        ensure!(access_minutes > 0, "ACCESS_TOKEN_TTL_MINUTES must be positive");
        ensure!(refresh_days > 0, "REFRESH_TOKEN_TTL_DAYS must be positive");
        ensure!(max_active > 0, "MAX_ACTIVE_REFRESH_TOKENS must be at least 1");

        let bind_addr = parse_or(&var, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;

        let bootstrap_admin = match (var("BOOTSTRAP_ADMIN_EMAIL"), var("BOOTSTRAP_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            _ => anyhow::bail!("BOOTSTRAP_ADMIN_EMAIL and BOOTSTRAP_ADMIN_PASSWORD must be set together"),
        };

        Ok(Self {
            tokens: TokenSettings {
                secret: secret.into_bytes(),
                issuer: var("JWT_ISSUER").unwrap_or_else(|| "keyward".to_string()),
                audience: var("JWT_AUDIENCE").unwrap_or_else(|| "keyward-api".to_string()),
                access_token_ttl: Duration::minutes(access_minutes),
                refresh_token_ttl: Duration::days(refresh_days),
            },
            max_active_refresh_tokens: max_active,
            permission_modules_path: var("PERMISSION_MODULES_PATH").map(PathBuf::from),
            bind_addr,
            database_url: var("DATABASE_URL"),
            bootstrap_admin,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

#[derive(Debug, Deserialize)]
struct ModuleConfig {
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    sort_order: i32,
    #[serde(default)]
    permissions: Vec<PermissionConfig>,
}

#[derive(Debug, Deserialize)]
struct PermissionConfig {
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    sort_order: i32,
    #[serde(default)]
    group: String,
}

/// Read extra permission modules from a JSON file.
pub fn load_permission_modules(path: &Path) -> Result<Vec<PermissionModule>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading permission modules from {}", path.display()))?;
    parse_permission_modules(&raw).with_context(|| format!("in {}", path.display()))
}

/// Parse a JSON array of modules. Configured permissions are never system
/// permissions.
pub fn parse_permission_modules(json: &str) -> Result<Vec<PermissionModule>> {
    let configs: Vec<ModuleConfig> =
        serde_json::from_str(json).context("permission modules must be a JSON array of modules")?;

    configs
        .into_iter()
        .map(|module| {
            let permissions = module
                .permissions
                .into_iter()
                .map(|p| {
                    PermissionDefinition::new(
                        p.name,
                        p.display_name,
                        module.name.as_str(),
                        p.description,
                        p.sort_order,
                        p.group,
                        false,
                    )
                })
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("module '{}'", module.name))?;

            PermissionModule::new(
                module.name.as_str(),
                module.display_name,
                module.description,
                module.sort_order,
                permissions,
            )
            .with_context(|| format!("module '{}'", module.name))
        })
        .collect()
}
