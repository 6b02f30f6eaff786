use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use keyward_auth::{ExpectedState, RefreshToken, RefreshTokenStore, Revocation, StoreError};
use keyward_core::UserId;

/// In-memory refresh-token store.
///
/// Intended for tests/dev. A single lock guards every record, so the
/// compare-and-set in `update_atomic` is trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStore {
    tokens: RwLock<HashMap<String, RefreshToken>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record ever stored for the user, revoked ones included.
    pub fn all_for_user(&self, user_id: UserId) -> Result<Vec<RefreshToken>, StoreError> {
        let tokens = self
            .tokens
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let mut records: Vec<_> = tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|t| t.created_at);
        Ok(records)
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn get_by_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        let tokens = self
            .tokens
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(tokens.get(token).cloned())
    }

    async fn active_count_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let tokens = self
            .tokens
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(tokens
            .values()
            .filter(|t| t.user_id == user_id && t.is_active(now))
            .count())
    }

    async fn active_tokens_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, StoreError> {
        let tokens = self
            .tokens
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(tokens
            .values()
            .filter(|t| t.user_id == user_id && t.is_active(now))
            .cloned()
            .collect())
    }

    async fn insert(&self, record: RefreshToken) -> Result<(), StoreError> {
        let mut tokens = self
            .tokens
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        if tokens.contains_key(&record.token) {
            return Err(StoreError::Conflict("refresh token already exists".to_string()));
        }
        tokens.insert(record.token.clone(), record);
        Ok(())
    }

    async fn update_atomic(&self, record: &RefreshToken, expected: &ExpectedState) -> Result<(), StoreError> {
        let mut tokens = self
            .tokens
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let current = tokens.get_mut(&record.token).ok_or(StoreError::NotFound)?;
        if !expected.matches(current) {
            return Err(StoreError::Conflict(
                "refresh token changed since it was read".to_string(),
            ));
        }
        *current = record.clone();
        Ok(())
    }

    async fn revoke_all(&self, user_id: UserId, revocation: &Revocation) -> Result<u64, StoreError> {
        let mut tokens = self
            .tokens
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let mut revoked = 0;
        for token in tokens
            .values_mut()
            .filter(|t| t.user_id == user_id && t.is_active(revocation.at))
        {
            token.revoke(revocation, None);
            revoked += 1;
        }
        Ok(revoked)
    }
}
