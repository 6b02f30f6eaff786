//! Session lifecycle: login, refresh-token rotation, logout.
//!
//! Refresh tokens move `Active → Rotated | Revoked` and never come back.
//! Rotation is committed with a compare-and-set against the store, keyed by
//! the token string, so two concurrent refreshes of the same token cannot
//! both win. Theft detection revokes every session of the user before the
//! rejection is returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use keyward_core::UserId;

use crate::Role;
use crate::error::{AuthError, RefreshRejection};
use crate::refresh_token::{ExpectedState, RefreshToken, Revocation};
use crate::store::{RefreshTokenStore, StoreError, UserAccount, UserStore};
use crate::token::{TokenError, TokenIssuer};

/// Login input. `Debug` never prints the password.
#[derive(Clone)]
pub struct Credentials {
    pub credential_id: String,
    pub password: String,
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("credential_id", &self.credential_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Public view of the authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrincipalSummary {
    pub user_id: UserId,
    pub credential_id: String,
    pub display_name: String,
    pub roles: Vec<Role>,
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub principal: PrincipalSummary,
}

/// Active session as listed to its owner (the token string is not echoed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_by_ip: Option<String>,
}

impl From<&RefreshToken> for SessionSummary {
    fn from(record: &RefreshToken) -> Self {
        Self {
            created_at: record.created_at,
            expires_at: record.expires_at,
            created_by_ip: record.created_by_ip.clone(),
        }
    }
}

enum RefreshFailure {
    Rejected(RefreshRejection),
    Failed(AuthError),
}

impl From<RefreshRejection> for RefreshFailure {
    fn from(value: RefreshRejection) -> Self {
        Self::Rejected(value)
    }
}

impl From<StoreError> for RefreshFailure {
    fn from(value: StoreError) -> Self {
        Self::Failed(value.into())
    }
}

impl From<AuthError> for RefreshFailure {
    fn from(value: AuthError) -> Self {
        Self::Failed(value)
    }
}

pub struct SessionManager {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn RefreshTokenStore>,
    issuer: TokenIssuer,
    max_active_tokens: usize,
}

impl SessionManager {
    /// `max_active_tokens` is clamped to at least 1.
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn RefreshTokenStore>,
        issuer: TokenIssuer,
        max_active_tokens: usize,
    ) -> Self {
        Self {
            users,
            tokens,
            issuer,
            max_active_tokens: max_active_tokens.max(1),
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn max_active_tokens(&self) -> usize {
        self.max_active_tokens
    }

    /// Authenticate and open a new session.
    ///
    /// Unknown account and wrong password are the same failure. Lockout and
    /// deactivation are only reported once the password has been checked.
    #[tracing::instrument(skip(self, credentials), fields(credential_id = %credentials.credential_id))]
    pub async fn login(
        &self,
        credentials: &Credentials,
        client_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, AuthError> {
        let Some(user) = self.users.find_by_credential_id(&credentials.credential_id).await? else {
            self.users.verify_unknown_password(&credentials.password).await?;
            tracing::info!("login rejected: unknown credential id");
            return Err(AuthError::InvalidCredentials);
        };

        let check = self.users.check_password(&user, &credentials.password).await?;
        if check.locked_out {
            tracing::warn!(user_id = %user.id, "login rejected: account locked out");
            return Err(AuthError::AccountLocked);
        }
        if !check.succeeded {
            tracing::info!(user_id = %user.id, "login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }
        if !self.users.is_active(&user).await? {
            tracing::info!(user_id = %user.id, "login rejected: account inactive");
            return Err(AuthError::AccountInactive);
        }

        let roles = self.users.roles(&user).await?;

        self.enforce_token_limit(user.id, client_ip, now).await?;

        let (session, record) = self.mint(&user, roles, client_ip, now)?;
        self.tokens.insert(record).await?;
        // The session is already live; a missed timestamp does not undo it.
        if let Err(e) = self.users.record_login(&user, now).await {
            tracing::warn!(user_id = %user.id, error = %e, "failed to record login time");
        }

        tracing::info!(user_id = %user.id, client_ip, "login succeeded");
        Ok(session)
    }

    /// Rotate a refresh token. The access token may be expired.
    pub async fn refresh(
        &self,
        access_token: &str,
        refresh_token: &str,
        client_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, AuthError> {
        match self.rotate(access_token, refresh_token, client_ip, now).await {
            Ok(session) => {
                tracing::info!(user_id = %session.principal.user_id, client_ip, "refresh token rotated");
                Ok(session)
            }
            Err(RefreshFailure::Rejected(reason)) => {
                tracing::warn!(client_ip, %reason, "refresh rejected");
                Err(AuthError::InvalidOrExpiredRefreshToken)
            }
            Err(RefreshFailure::Failed(e)) => Err(e),
        }
    }

    async fn rotate(
        &self,
        access_token: &str,
        refresh_token: &str,
        client_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, RefreshFailure> {
        let claims = self
            .issuer
            .validate_expired_access_token(access_token)
            .ok_or(RefreshRejection::InvalidAccessToken)?;
        let user_id = claims
            .user_id()
            .map_err(|_| RefreshRejection::InvalidAccessToken)?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(RefreshRejection::UnknownUser)?;
        if !self.users.is_active(&user).await? {
            return Err(RefreshRejection::UserInactive.into());
        }

        let stored = self
            .tokens
            .get_by_token(refresh_token)
            .await?
            .ok_or(RefreshRejection::NotFound)?;
        if stored.user_id != user.id {
            return Err(RefreshRejection::OwnerMismatch.into());
        }
        if stored.is_revoked {
            return Err(RefreshRejection::Revoked.into());
        }
        if stored.is_expired(now) {
            return Err(RefreshRejection::Expired.into());
        }

        if stored.jwt_id != claims.jti {
            let revoked = self
                .tokens
                .revoke_all(user.id, &Revocation::new(now, client_ip))
                .await?;
            tracing::error!(
                user_id = %user.id,
                client_ip,
                revoked,
                "refresh token presented with a foreign access token; all sessions revoked"
            );
            return Err(RefreshRejection::TokenTheftDetected.into());
        }

        let roles = self.users.roles(&user).await?;
        let (session, successor) = self.mint(&user, roles, client_ip, now)?;

        let expected = ExpectedState::of(&stored);
        let mut rotated = stored;
        rotated.revoke(&Revocation::new(now, client_ip), Some(successor.token.clone()));

        match self.tokens.update_atomic(&rotated, &expected).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(RefreshRejection::ConcurrentRotation.into()),
            Err(e) => return Err(e.into()),
        }
        self.tokens.insert(successor).await?;

        Ok(session)
    }

    /// Revoke every active session of the user. Idempotent.
    pub async fn logout(
        &self,
        user_id: UserId,
        client_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let revoked = self
            .tokens
            .revoke_all(user_id, &Revocation::new(now, client_ip))
            .await?;
        tracing::info!(user_id = %user_id, client_ip, revoked, "logout");
        Ok(revoked)
    }

    /// Revoke one of the user's own sessions.
    pub async fn revoke_session(
        &self,
        user_id: UserId,
        refresh_token: &str,
        client_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let record = match self.tokens.get_by_token(refresh_token).await? {
            Some(r) if r.user_id == user_id && r.is_active(now) => r,
            _ => return Err(AuthError::InvalidOrExpiredRefreshToken),
        };

        let expected = ExpectedState::of(&record);
        let mut revoked = record;
        revoked.revoke(&Revocation::new(now, client_ip), None);

        match self.tokens.update_atomic(&revoked, &expected).await {
            Ok(()) => {
                tracing::info!(user_id = %user_id, client_ip, "session revoked");
                Ok(())
            }
            Err(StoreError::Conflict(_)) => Err(AuthError::InvalidOrExpiredRefreshToken),
            Err(e) => Err(e.into()),
        }
    }

    /// The user's active sessions, oldest first.
    pub async fn active_sessions(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionSummary>, AuthError> {
        let mut active = self.tokens.active_tokens_for_user(user_id, now).await?;
        active.sort_by_key(|t| t.created_at);
        Ok(active.iter().map(SessionSummary::from).collect())
    }

    /// Make room for one more session: revoke the oldest active tokens until
    /// at most `max_active_tokens - 1` remain.
    ///
    /// Best effort per user: a token revoked concurrently is skipped, and a
    /// racing login may briefly leave one extra active token.
    async fn enforce_token_limit(
        &self,
        user_id: UserId,
        client_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let active = self.tokens.active_count_for_user(user_id, now).await?;
        if active < self.max_active_tokens {
            return Ok(());
        }

        let mut tokens = self.tokens.active_tokens_for_user(user_id, now).await?;
        tokens.sort_by_key(|t| t.created_at);
        let excess = tokens.len().saturating_sub(self.max_active_tokens - 1);
        let revocation = Revocation::new(now, client_ip);

        let mut evicted = 0usize;
        for mut token in tokens.into_iter().take(excess) {
            let expected = ExpectedState::of(&token);
            token.revoke(&revocation, None);
            match self.tokens.update_atomic(&token, &expected).await {
                Ok(()) => evicted += 1,
                Err(StoreError::Conflict(_)) => {
                    tracing::debug!(user_id = %user_id, "token already revoked during eviction");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(user_id = %user_id, evicted, limit = self.max_active_tokens, "evicted oldest sessions");
        Ok(())
    }

    fn mint(
        &self,
        user: &UserAccount,
        roles: Vec<Role>,
        client_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(AuthSession, RefreshToken), AuthError> {
        let access = self.issuer.issue_access_token(user.id, &roles, now)?;
        let jwt_id = self
            .issuer
            .extract_jwt_id(&access.token)
            .ok_or(TokenError::MissingJwtId)?;
        let refresh_token = self.issuer.issue_refresh_token();
        let refresh_expires_at = self.issuer.refresh_token_expiry(now);

        let record = RefreshToken::new(
            refresh_token.clone(),
            user.id,
            jwt_id,
            now,
            refresh_expires_at,
            client_ip,
        );

        let session = AuthSession {
            access_token: access.token,
            refresh_token,
            expires_at: access.expires_at,
            refresh_token_expires_at: refresh_expires_at,
            principal: PrincipalSummary {
                user_id: user.id,
                credential_id: user.credential_id.clone(),
                display_name: user.display_name.clone(),
                roles,
            },
        };

        Ok((session, record))
    }
}
