//! Access/refresh token minting and validation.
//!
//! Access tokens are HS256 JWTs over a shared secret. Refresh tokens are
//! opaque random strings: lookup keys into the refresh-token store, nothing
//! more. Everything here is stateless and safe to call from any number of
//! requests in parallel.

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use keyward_core::UserId;

use crate::Role;
use crate::claims::{AccessTokenClaims, TokenValidationError, validate_lifetime};

/// Refresh tokens carry 512 bits of entropy.
const REFRESH_TOKEN_BYTES: usize = 64;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("access token could not be signed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("access token rejected: {0}")]
    Rejected(#[source] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Lifetime(#[from] TokenValidationError),

    #[error("access token carries no readable jti")]
    MissingJwtId,
}

/// Static signing configuration.
#[derive(Clone)]
pub struct TokenSettings {
    pub secret: Vec<u8>,
    pub issuer: String,
    pub audience: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl core::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .finish()
    }
}

/// A freshly signed access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl core::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct JwtIdOnly {
    jti: String,
}

impl TokenIssuer {
    pub fn new(settings: TokenSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(&settings.secret),
            decoding_key: DecodingKey::from_secret(&settings.secret),
            issuer: settings.issuer,
            audience: settings.audience,
            access_token_ttl: settings.access_token_ttl,
            refresh_token_ttl: settings.refresh_token_ttl,
        }
    }

    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    pub fn refresh_token_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.refresh_token_ttl
    }

    /// Sign an access token for `subject`. Every call gets a fresh `jti`.
    pub fn issue_access_token(
        &self,
        subject: UserId,
        roles: &[Role],
        now: DateTime<Utc>,
    ) -> Result<AccessToken, TokenError> {
        let expires_at = now + self.access_token_ttl;
        let claims = AccessTokenClaims {
            sub: subject.to_string(),
            jti: Uuid::new_v4().to_string(),
            roles: roles.to_vec(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)?;

        Ok(AccessToken { token, expires_at })
    }

    /// Opaque refresh token: OS randomness, standard base64.
    pub fn issue_refresh_token(&self) -> String {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    /// Signature, algorithm, issuer and audience checks. Expiry is left to
    /// the caller.
    fn structural_validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation
    }

    fn decode_structural(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        decode::<AccessTokenClaims>(token, &self.decoding_key, &self.structural_validation())
            .map(|data| data.claims)
            .map_err(TokenError::Rejected)
    }

    /// Full validation for authenticating a request, expiry included.
    pub fn validate_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessTokenClaims, TokenError> {
        let claims = self.decode_structural(token)?;
        validate_lifetime(&claims, now)?;
        Ok(claims)
    }

    /// Validate a possibly-expired access token (refresh flow).
    ///
    /// `None` means the token cannot be trusted; the reason is only logged.
    pub fn validate_expired_access_token(&self, token: &str) -> Option<AccessTokenClaims> {
        match self.decode_structural(token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!("untrusted access token presented: {e}");
                None
            }
        }
    }

    /// Read the `jti` without verifying anything.
    ///
    /// Only for tokens that were already validated, or that are explicitly
    /// treated as untrusted.
    pub fn extract_jwt_id(&self, token: &str) -> Option<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<JwtIdOnly>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims.jti)
            .filter(|jti| !jti.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn settings(secret: &str) -> TokenSettings {
        TokenSettings {
            secret: secret.as_bytes().to_vec(),
            issuer: "keyward".to_string(),
            audience: "keyward-api".to_string(),
            access_token_ttl: Duration::minutes(15),
            refresh_token_ttl: Duration::days(7),
        }
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(settings("test-secret"))
    }

    #[test]
    fn issued_token_round_trips_claims() {
        let issuer = issuer();
        let user = UserId::new();
        let now = Utc::now();

        let access = issuer
            .issue_access_token(user, &[Role::ADMINISTRATOR, Role::USER], now)
            .unwrap();
        let claims = issuer.validate_access_token(&access.token, now).unwrap();

        assert_eq!(claims.sub, user.to_string());
        assert_eq!(claims.roles, vec![Role::ADMINISTRATOR, Role::USER]);
        assert_eq!(claims.iss, "keyward");
        assert_eq!(claims.exp, access.expires_at.timestamp());
    }

    #[test]
    fn jti_is_fresh_per_call() {
        let issuer = issuer();
        let user = UserId::new();
        let now = Utc::now();

        let jtis: HashSet<_> = (0..20)
            .map(|_| {
                let t = issuer.issue_access_token(user, &[], now).unwrap();
                issuer.extract_jwt_id(&t.token).unwrap()
            })
            .collect();
        assert_eq!(jtis.len(), 20);
    }

    #[test]
    fn expired_token_fails_full_validation_but_passes_structural() {
        let issuer = issuer();
        let issued_at = Utc::now() - Duration::hours(2);
        let access = issuer.issue_access_token(UserId::new(), &[], issued_at).unwrap();

        assert!(matches!(
            issuer.validate_access_token(&access.token, Utc::now()),
            Err(TokenError::Lifetime(TokenValidationError::Expired))
        ));
        assert!(issuer.validate_expired_access_token(&access.token).is_some());
    }

    #[test]
    fn wrong_secret_is_untrusted() {
        let access = TokenIssuer::new(settings("other-secret"))
            .issue_access_token(UserId::new(), &[], Utc::now())
            .unwrap();
        assert!(issuer().validate_expired_access_token(&access.token).is_none());
    }

    #[test]
    fn wrong_audience_or_issuer_is_untrusted() {
        let mut foreign = settings("test-secret");
        foreign.audience = "someone-else".to_string();
        let access = TokenIssuer::new(foreign)
            .issue_access_token(UserId::new(), &[], Utc::now())
            .unwrap();
        assert!(issuer().validate_expired_access_token(&access.token).is_none());

        let mut foreign = settings("test-secret");
        foreign.issuer = "impostor".to_string();
        let access = TokenIssuer::new(foreign)
            .issue_access_token(UserId::new(), &[], Utc::now())
            .unwrap();
        assert!(issuer().validate_expired_access_token(&access.token).is_none());
    }

    #[test]
    fn algorithm_mismatch_is_untrusted() {
        let issuer = issuer();
        let claims = AccessTokenClaims {
            sub: UserId::new().to_string(),
            jti: "x".to_string(),
            roles: vec![],
            iss: "keyward".to_string(),
            aud: "keyward-api".to_string(),
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
        };
        let hs512 = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(issuer.validate_expired_access_token(&hs512).is_none());
    }

    #[test]
    fn garbage_is_untrusted_not_a_panic() {
        let issuer = issuer();
        assert!(issuer.validate_expired_access_token("not.a.jwt").is_none());
        assert!(issuer.validate_expired_access_token("").is_none());
        assert!(issuer.extract_jwt_id("not-even-close").is_none());
    }

    #[test]
    fn extract_jwt_id_ignores_signature() {
        let access = TokenIssuer::new(settings("other-secret"))
            .issue_access_token(UserId::new(), &[], Utc::now())
            .unwrap();
        assert!(issuer().extract_jwt_id(&access.token).is_some());
    }

    #[test]
    fn refresh_tokens_are_random_and_long() {
        let issuer = issuer();
        let a = issuer.issue_refresh_token();
        let b = issuer.issue_refresh_token();
        assert_ne!(a, b);

        let raw = base64::engine::general_purpose::STANDARD.decode(&a).unwrap();
        assert_eq!(raw.len(), REFRESH_TOKEN_BYTES);
    }
}
