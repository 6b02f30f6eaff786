use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keyward_core::UserId;

/// Persisted refresh-token record.
///
/// Lifecycle: `Active → Rotated (replaced_by_token set) | Revoked`. Records
/// are mutated on rotation/revocation and never deleted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token: String,
    pub user_id: UserId,
    /// `jti` of the access token issued alongside this refresh token.
    pub jwt_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_by_ip: Option<String>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by_ip: Option<String>,
    pub replaced_by_token: Option<String>,
}

/// Who revoked a token, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    pub at: DateTime<Utc>,
    pub by_ip: Option<String>,
}

impl Revocation {
    pub fn new(at: DateTime<Utc>, by_ip: Option<&str>) -> Self {
        Self {
            at,
            by_ip: by_ip.map(str::to_string),
        }
    }
}

/// Precondition for an atomic record update: the mutable fields must still
/// hold these values in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedState {
    pub is_revoked: bool,
    pub replaced_by_token: Option<String>,
}

impl ExpectedState {
    pub fn of(record: &RefreshToken) -> Self {
        Self {
            is_revoked: record.is_revoked,
            replaced_by_token: record.replaced_by_token.clone(),
        }
    }

    pub fn matches(&self, record: &RefreshToken) -> bool {
        record.is_revoked == self.is_revoked && record.replaced_by_token == self.replaced_by_token
    }
}

impl RefreshToken {
    pub fn new(
        token: String,
        user_id: UserId,
        jwt_id: String,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        created_by_ip: Option<&str>,
    ) -> Self {
        Self {
            token,
            user_id,
            jwt_id,
            created_at,
            expires_at,
            created_by_ip: created_by_ip.map(str::to_string),
            is_revoked: false,
            revoked_at: None,
            revoked_by_ip: None,
            replaced_by_token: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired(now)
    }

    /// Mark revoked, optionally linking the successor. There is no way back.
    pub fn revoke(&mut self, revocation: &Revocation, replaced_by: Option<String>) {
        self.is_revoked = true;
        self.revoked_at = Some(revocation.at);
        self.revoked_by_ip = revocation.by_ip.clone();
        if replaced_by.is_some() {
            self.replaced_by_token = replaced_by;
        }
    }
}
