//! Collaborator boundaries consumed by the session manager and the API.
//!
//! Implementations live in `keyward-infra` (in-memory for dev/tests,
//! Postgres for refresh tokens). Calls are async so that dropping a request
//! future cancels the store access; retries, if any, belong to the store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use keyward_core::UserId;

use crate::Role;
use crate::refresh_token::{ExpectedState, RefreshToken, Revocation};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Precondition failed or key already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Identity of a user account, as the user store exposes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    /// Login name (e.g. email).
    pub credential_id: String,
    pub display_name: String,
}

/// Outcome of a password check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PasswordCheck {
    pub succeeded: bool,
    pub locked_out: bool,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_credential_id(&self, credential_id: &str) -> Result<Option<UserAccount>, StoreError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserAccount>, StoreError>;

    /// Verify a password with the identity subsystem's hasher, applying its
    /// lockout policy.
    async fn check_password(&self, user: &UserAccount, password: &str) -> Result<PasswordCheck, StoreError>;

    /// Spend the cost of a password check when no account matched, so that
    /// login latency does not reveal whether a credential id exists.
    async fn verify_unknown_password(&self, _password: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn roles(&self, user: &UserAccount) -> Result<Vec<Role>, StoreError>;

    async fn is_active(&self, user: &UserAccount) -> Result<bool, StoreError>;

    async fn record_login(&self, user: &UserAccount, at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn get_by_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError>;

    async fn active_count_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> Result<usize, StoreError>;

    async fn active_tokens_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, StoreError>;

    /// Insert a new record. `Conflict` if the token string already exists.
    async fn insert(&self, record: RefreshToken) -> Result<(), StoreError>;

    /// Replace the record keyed by `record.token`, but only if the stored
    /// record still matches `expected`. `Conflict` otherwise.
    async fn update_atomic(&self, record: &RefreshToken, expected: &ExpectedState) -> Result<(), StoreError>;

    /// Revoke every token of the user that is active at `revocation.at`;
    /// returns how many were revoked.
    async fn revoke_all(&self, user_id: UserId, revocation: &Revocation) -> Result<u64, StoreError>;
}

/// Permission claims attached to roles (stored externally).
#[async_trait]
pub trait RolePermissionSource: Send + Sync {
    async fn permissions_for_roles(&self, roles: &[Role]) -> Result<Vec<String>, StoreError>;
}
