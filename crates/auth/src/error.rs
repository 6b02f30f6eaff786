use thiserror::Error;

use crate::store::StoreError;
use crate::token::TokenError;

/// Outcome of a failed session operation, as callers see it.
///
/// Credential failures do not say whether the account exists; every refresh
/// rejection collapses into [`AuthError::InvalidOrExpiredRefreshToken`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is locked")]
    AccountLocked,

    #[error("account is inactive")]
    AccountInactive,

    #[error("invalid or expired refresh token")]
    InvalidOrExpiredRefreshToken,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a refresh attempt was rejected. Logged, never returned to callers.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRejection {
    #[error("access token failed structural validation")]
    InvalidAccessToken,

    #[error("subject no longer exists")]
    UnknownUser,

    #[error("subject is deactivated")]
    UserInactive,

    #[error("refresh token not found")]
    NotFound,

    #[error("refresh token belongs to another user")]
    OwnerMismatch,

    #[error("refresh token already revoked")]
    Revoked,

    #[error("refresh token expired")]
    Expired,

    /// Presented access token is not the one this refresh token was issued
    /// with. All of the user's sessions are revoked before rejecting.
    #[error("refresh token theft detected")]
    TokenTheftDetected,

    #[error("refresh token rotated by a concurrent request")]
    ConcurrentRotation,
}
