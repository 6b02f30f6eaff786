//! Infrastructure layer: configuration, account and token stores.

pub mod config;
pub mod refresh_tokens;
pub mod role_permissions;
pub mod users;

pub use config::{AppConfig, BootstrapAdmin, load_permission_modules, parse_permission_modules};
pub use refresh_tokens::{InMemoryRefreshTokenStore, PostgresRefreshTokenStore};
pub use role_permissions::InMemoryRolePermissions;
pub use users::{InMemoryUserStore, LockoutPolicy, NewUser, PasswordHasherConfig};
