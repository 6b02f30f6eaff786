use serde::{Deserialize, Serialize};

use keyward_auth::SessionSummary;

// -------------------------
// Request DTOs
// -------------------------

/// Not `Debug`: carries a password.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email")]
    pub credential_id: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct RevokeSessionRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub policy: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}
