use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use keyward_auth::{PasswordCheck, Role, StoreError, UserAccount, UserStore};
use keyward_core::UserId;

use super::password::PasswordHasherConfig;

/// Password hashed once per store; unknown-account logins verify against it.
const UNKNOWN_ACCOUNT_PASSWORD: &str = "keyward-unknown-account";

/// Failed attempts before an account locks, and for how long.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(15),
        }
    }
}

/// Input for [`InMemoryUserStore::add_user`].
pub struct NewUser<'a> {
    pub credential_id: &'a str,
    pub display_name: &'a str,
    pub password: &'a str,
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone)]
struct UserRecord {
    account: UserAccount,
    password_hash: String,
    roles: Vec<Role>,
    is_active: bool,
    failed_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
}

/// In-memory user store with argon2 password hashes and lockout.
///
/// Intended for tests/dev. Credential ids match case-insensitively.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<UserId, UserRecord>>,
    hasher: Arc<PasswordHasherConfig>,
    lockout: LockoutPolicy,
    unknown_account_hash: Arc<OnceLock<String>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(hasher: PasswordHasherConfig, lockout: LockoutPolicy) -> Self {
        Self {
            users: RwLock::default(),
            hasher: Arc::new(hasher),
            lockout,
            unknown_account_hash: Arc::default(),
        }
    }

    /// Create an active account. Fails if the credential id is taken.
    pub fn add_user(&self, user: NewUser<'_>) -> Result<UserAccount> {
        let password_hash = self.hasher.hash_password(user.password)?;
        let mut users = self.write()?;

        if users
            .values()
            .any(|r| r.account.credential_id.eq_ignore_ascii_case(user.credential_id))
        {
            anyhow::bail!("credential id '{}' is already registered", user.credential_id);
        }

        let account = UserAccount {
            id: UserId::new(),
            credential_id: user.credential_id.to_string(),
            display_name: user.display_name.to_string(),
        };
        users.insert(
            account.id,
            UserRecord {
                account: account.clone(),
                password_hash,
                roles: user.roles,
                is_active: true,
                failed_attempts: 0,
                locked_until: None,
                last_login_at: None,
            },
        );
        Ok(account)
    }

    pub fn set_active(&self, id: UserId, active: bool) -> Result<(), StoreError> {
        self.update(id, |r| r.is_active = active)
    }

    pub fn set_roles(&self, id: UserId, roles: Vec<Role>) -> Result<(), StoreError> {
        self.update(id, |r| r.roles = roles)
    }

    pub fn last_login(&self, id: UserId) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.read()?.get(&id).and_then(|r| r.last_login_at))
    }

    fn update(&self, id: UserId, apply: impl FnOnce(&mut UserRecord)) -> Result<(), StoreError> {
        let mut users = self.write()?;
        let record = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        apply(record);
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<UserId, UserRecord>>, StoreError> {
        self.users
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<UserId, UserRecord>>, StoreError> {
        self.users
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn record(&self, user: &UserAccount) -> Result<UserRecord, StoreError> {
        self.read()?.get(&user.id).cloned().ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_credential_id(&self, credential_id: &str) -> Result<Option<UserAccount>, StoreError> {
        Ok(self
            .read()?
            .values()
            .find(|r| r.account.credential_id.eq_ignore_ascii_case(credential_id))
            .map(|r| r.account.clone()))
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.read()?.get(&id).map(|r| r.account.clone()))
    }

    async fn check_password(&self, user: &UserAccount, password: &str) -> Result<PasswordCheck, StoreError> {
        let now = Utc::now();
        let record = self.record(user)?;
        if record.locked_until.is_some_and(|until| now < until) {
            return Ok(PasswordCheck {
                succeeded: false,
                locked_out: true,
            });
        }

        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        let hash = record.password_hash;
        let verified = tokio::task::spawn_blocking(move || hasher.verify_password(&password, &hash))
            .await
            .map_err(|e| StoreError::Backend(format!("password verification task failed: {e}")))?;

        let mut users = self.write()?;
        let record = users.get_mut(&user.id).ok_or(StoreError::NotFound)?;
        if verified {
            record.failed_attempts = 0;
            record.locked_until = None;
            return Ok(PasswordCheck {
                succeeded: true,
                locked_out: false,
            });
        }

        record.failed_attempts += 1;
        let locked_out = record.failed_attempts >= self.lockout.max_failed_attempts;
        if locked_out {
            record.failed_attempts = 0;
            record.locked_until = Some(now + self.lockout.lockout_duration);
            tracing::warn!(user_id = %user.id, "account locked after repeated password failures");
        }
        Ok(PasswordCheck {
            succeeded: false,
            locked_out,
        })
    }

    async fn verify_unknown_password(&self, password: &str) -> Result<(), StoreError> {
        let hasher = Arc::clone(&self.hasher);
        let cached = Arc::clone(&self.unknown_account_hash);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let hash = match cached.get() {
                Some(hash) => hash,
                None => {
                    let fresh = hasher
                        .hash_password(UNKNOWN_ACCOUNT_PASSWORD)
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    cached.get_or_init(|| fresh)
                }
            };
            // Result ignored; only the cost matters.
            let _ = hasher.verify_password(&password, hash);
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("password verification task failed: {e}")))?
    }

    async fn roles(&self, user: &UserAccount) -> Result<Vec<Role>, StoreError> {
        Ok(self.record(user)?.roles)
    }

    async fn is_active(&self, user: &UserAccount) -> Result<bool, StoreError> {
        Ok(self.read()?.get(&user.id).is_some_and(|r| r.is_active))
    }

    async fn record_login(&self, user: &UserAccount, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.update(user.id, |r| r.last_login_at = Some(at))
    }
}
