use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use keyward_core::{DomainResult, UserId};

use crate::Role;

/// Claims embedded in every access token.
///
/// Timestamps are seconds since the Unix epoch, as JWT registered claims
/// require.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject: the user id.
    pub sub: String,

    /// Unique token id; binds the access token to its refresh token.
    pub jti: String,

    #[serde(default)]
    pub roles: Vec<Role>,

    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessTokenClaims {
    pub fn user_id(&self) -> DomainResult<UserId> {
        self.sub.parse()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the lifetime claims against `now`.
///
/// Signature and issuer/audience checks happen while decoding; this only
/// looks at `iat`/`exp`.
pub fn validate_lifetime(
    claims: &AccessTokenClaims,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    let now = now.timestamp();
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn claims(iat: DateTime<Utc>, exp: DateTime<Utc>) -> AccessTokenClaims {
        AccessTokenClaims {
            sub: UserId::new().to_string(),
            jti: "jti-1".to_string(),
            roles: vec![Role::USER],
            iss: "keyward".to_string(),
            aud: "keyward-api".to_string(),
            iat: iat.timestamp(),
            exp: exp.timestamp(),
        }
    }

    #[test]
    fn accepts_within_window() {
        let now = Utc::now();
        let c = claims(now, now + Duration::minutes(5));
        assert_eq!(validate_lifetime(&c, now + Duration::minutes(1)), Ok(()));
    }

    #[test]
    fn rejects_at_expiry_boundary() {
        let now = Utc::now();
        let c = claims(now, now + Duration::minutes(5));
        assert_eq!(
            validate_lifetime(&c, now + Duration::minutes(5)),
            Err(TokenValidationError::Expired)
        );
    }

    #[test]
    fn rejects_future_and_inverted_windows() {
        let now = Utc::now();
        let future = claims(now + Duration::minutes(1), now + Duration::minutes(5));
        assert_eq!(validate_lifetime(&future, now), Err(TokenValidationError::NotYetValid));

        let inverted = claims(now, now - Duration::minutes(1));
        assert_eq!(
            validate_lifetime(&inverted, now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn subject_parses_into_user_id() {
        let now = Utc::now();
        let c = claims(now, now + Duration::minutes(5));
        assert_eq!(c.user_id().unwrap().to_string(), c.sub);
    }
}
