//! Session lifecycle against the in-memory stores: login, rotation, theft
//! detection, eviction and logout.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use keyward_auth::{
    AuthError, Credentials, PasswordCheck, RefreshTokenStore, Role, SessionManager, StoreError,
    TokenIssuer, TokenSettings, UserAccount, UserStore,
};
use keyward_core::UserId;
use keyward_infra::{
    InMemoryRefreshTokenStore, InMemoryUserStore, LockoutPolicy, NewUser, PasswordHasherConfig,
};

const PASSWORD: &str = "correct horse battery staple";
const IP: Option<&str> = Some("203.0.113.7");

struct Harness {
    users: Arc<InMemoryUserStore>,
    tokens: Arc<InMemoryRefreshTokenStore>,
    sessions: Arc<SessionManager>,
    account: UserAccount,
    t0: DateTime<Utc>,
}

fn settings(secret: &str) -> TokenSettings {
    TokenSettings {
        secret: secret.as_bytes().to_vec(),
        issuer: "keyward".to_string(),
        audience: "keyward-api".to_string(),
        access_token_ttl: Duration::minutes(15),
        refresh_token_ttl: Duration::days(7),
    }
}

fn harness(max_active_tokens: usize) -> Harness {
    let users = Arc::new(InMemoryUserStore::with_settings(
        PasswordHasherConfig::with_cost(8, 1, 1).unwrap(),
        LockoutPolicy {
            max_failed_attempts: 3,
            lockout_duration: Duration::minutes(15),
        },
    ));
    let account = users
        .add_user(NewUser {
            credential_id: "alice@example.com",
            display_name: "Alice",
            password: PASSWORD,
            roles: vec![Role::USER],
        })
        .unwrap();
    let tokens = Arc::new(InMemoryRefreshTokenStore::new());
    let sessions = Arc::new(SessionManager::new(
        users.clone(),
        tokens.clone(),
        TokenIssuer::new(settings("integration-test-secret")),
        max_active_tokens,
    ));

    Harness {
        users,
        tokens,
        sessions,
        account,
        t0: Utc::now(),
    }
}

fn credentials(password: &str) -> Credentials {
    Credentials {
        credential_id: "alice@example.com".to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn login_issues_an_active_pair_and_records_the_login() {
    let h = harness(5);
    let session = h.sessions.login(&credentials(PASSWORD), IP, h.t0).await.unwrap();

    assert_eq!(session.principal.user_id, h.account.id);
    assert_eq!(session.principal.roles, vec![Role::USER]);
    assert_eq!(session.expires_at, h.t0 + Duration::minutes(15));
    assert_eq!(session.refresh_token_expires_at, h.t0 + Duration::days(7));

    let record = h.tokens.get_by_token(&session.refresh_token).await.unwrap().unwrap();
    assert!(record.is_active(h.t0));
    assert_eq!(record.created_by_ip.as_deref(), IP);
    let claims = h
        .sessions
        .issuer()
        .validate_access_token(&session.access_token, h.t0)
        .unwrap();
    assert_eq!(record.jwt_id, claims.jti);

    assert_eq!(h.users.last_login(h.account.id).unwrap(), Some(h.t0));
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let h = harness(5);
    let wrong = h.sessions.login(&credentials("nope"), IP, h.t0).await.unwrap_err();
    let unknown = h
        .sessions
        .login(
            &Credentials {
                credential_id: "mallory@example.com".to_string(),
                password: PASSWORD.to_string(),
            },
            IP,
            h.t0,
        )
        .await
        .unwrap_err();

    assert!(matches!(wrong, AuthError::InvalidCredentials));
    assert!(matches!(unknown, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn repeated_failures_lock_the_account() {
    let h = harness(5);
    for _ in 0..2 {
        let err = h.sessions.login(&credentials("nope"), IP, h.t0).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
    let third = h.sessions.login(&credentials("nope"), IP, h.t0).await.unwrap_err();
    assert!(matches!(third, AuthError::AccountLocked));

    let correct = h.sessions.login(&credentials(PASSWORD), IP, h.t0).await.unwrap_err();
    assert!(matches!(correct, AuthError::AccountLocked));
}

#[tokio::test]
async fn inactive_account_is_refused_after_the_password_check() {
    let h = harness(5);
    h.users.set_active(h.account.id, false).unwrap();

    let right = h.sessions.login(&credentials(PASSWORD), IP, h.t0).await.unwrap_err();
    assert!(matches!(right, AuthError::AccountInactive));

    let wrong = h.sessions.login(&credentials("nope"), IP, h.t0).await.unwrap_err();
    assert!(matches!(wrong, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn refresh_rotates_exactly_once() {
    let h = harness(5);
    let first = h.sessions.login(&credentials(PASSWORD), IP, h.t0).await.unwrap();

    // The access token may already be expired.
    let later = h.t0 + Duration::hours(1);
    let second = h
        .sessions
        .refresh(&first.access_token, &first.refresh_token, IP, later)
        .await
        .unwrap();
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_ne!(second.access_token, first.access_token);

    let old = h.tokens.get_by_token(&first.refresh_token).await.unwrap().unwrap();
    assert!(old.is_revoked);
    assert_eq!(old.replaced_by_token.as_deref(), Some(second.refresh_token.as_str()));
    assert_eq!(old.revoked_at, Some(later));

    let replay = h
        .sessions
        .refresh(&first.access_token, &first.refresh_token, IP, later)
        .await
        .unwrap_err();
    assert!(matches!(replay, AuthError::InvalidOrExpiredRefreshToken));
}

#[tokio::test]
async fn foreign_access_token_revokes_every_session() {
    let h = harness(5);
    let first = h.sessions.login(&credentials(PASSWORD), IP, h.t0).await.unwrap();
    let other_device = h
        .sessions
        .login(&credentials(PASSWORD), Some("198.51.100.1"), h.t0 + Duration::seconds(1))
        .await
        .unwrap();
    let second = h
        .sessions
        .refresh(&first.access_token, &first.refresh_token, IP, h.t0 + Duration::minutes(1))
        .await
        .unwrap();
    let rt1 = h.tokens.get_by_token(&first.refresh_token).await.unwrap().unwrap();
    assert_eq!(rt1.replaced_by_token.as_deref(), Some(second.refresh_token.as_str()));

    // Stolen RT2 presented together with the superseded AT1.
    let at = h.t0 + Duration::minutes(2);
    let err = h
        .sessions
        .refresh(&first.access_token, &second.refresh_token, IP, at)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidOrExpiredRefreshToken));

    let rt2 = h.tokens.get_by_token(&second.refresh_token).await.unwrap().unwrap();
    assert!(rt2.is_revoked);
    let other = h.tokens.get_by_token(&other_device.refresh_token).await.unwrap().unwrap();
    assert!(other.is_revoked);
    assert_eq!(h.tokens.active_count_for_user(h.account.id, at).await.unwrap(), 0);

    // The legitimate pair is dead too.
    let retry = h
        .sessions
        .refresh(&second.access_token, &second.refresh_token, IP, at)
        .await
        .unwrap_err();
    assert!(matches!(retry, AuthError::InvalidOrExpiredRefreshToken));
}

#[tokio::test]
async fn refresh_rejects_tokens_of_another_user() {
    let h = harness(5);
    h.users
        .add_user(NewUser {
            credential_id: "bob@example.com",
            display_name: "Bob",
            password: PASSWORD,
            roles: vec![],
        })
        .unwrap();
    let alice = h.sessions.login(&credentials(PASSWORD), IP, h.t0).await.unwrap();
    let bob = h
        .sessions
        .login(
            &Credentials {
                credential_id: "bob@example.com".to_string(),
                password: PASSWORD.to_string(),
            },
            IP,
            h.t0,
        )
        .await
        .unwrap();

    let err = h
        .sessions
        .refresh(&alice.access_token, &bob.refresh_token, IP, h.t0)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidOrExpiredRefreshToken));

    // Ownership mismatch is not theft: both sessions survive.
    assert!(h.tokens.get_by_token(&bob.refresh_token).await.unwrap().unwrap().is_active(h.t0));
    assert!(h.tokens.get_by_token(&alice.refresh_token).await.unwrap().unwrap().is_active(h.t0));
}

#[tokio::test]
async fn refresh_rejects_expired_unknown_and_forged_input() {
    let h = harness(5);
    let session = h.sessions.login(&credentials(PASSWORD), IP, h.t0).await.unwrap();

    let expired = h
        .sessions
        .refresh(&session.access_token, &session.refresh_token, IP, h.t0 + Duration::days(8))
        .await
        .unwrap_err();
    assert!(matches!(expired, AuthError::InvalidOrExpiredRefreshToken));

    let unknown = h
        .sessions
        .refresh(&session.access_token, "not-a-token", IP, h.t0)
        .await
        .unwrap_err();
    assert!(matches!(unknown, AuthError::InvalidOrExpiredRefreshToken));

    let forged = TokenIssuer::new(settings("some-other-secret"))
        .issue_access_token(h.account.id, &[Role::ADMINISTRATOR], h.t0)
        .unwrap();
    let err = h
        .sessions
        .refresh(&forged.token, &session.refresh_token, IP, h.t0)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidOrExpiredRefreshToken));

    // None of the rejections touched the live token.
    let record = h.tokens.get_by_token(&session.refresh_token).await.unwrap().unwrap();
    assert!(record.is_active(h.t0));
}

#[tokio::test]
async fn deactivated_user_cannot_refresh() {
    let h = harness(5);
    let session = h.sessions.login(&credentials(PASSWORD), IP, h.t0).await.unwrap();
    h.users.set_active(h.account.id, false).unwrap();

    let err = h
        .sessions
        .refresh(&session.access_token, &session.refresh_token, IP, h.t0)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidOrExpiredRefreshToken));
}

#[tokio::test]
async fn revoked_token_cannot_be_refreshed() {
    let h = harness(5);
    let session = h.sessions.login(&credentials(PASSWORD), IP, h.t0).await.unwrap();

    h.sessions
        .revoke_session(h.account.id, &session.refresh_token, IP, h.t0)
        .await
        .unwrap();

    let err = h
        .sessions
        .refresh(&session.access_token, &session.refresh_token, IP, h.t0)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidOrExpiredRefreshToken));

    // Revoking twice is refused.
    let again = h
        .sessions
        .revoke_session(h.account.id, &session.refresh_token, IP, h.t0)
        .await
        .unwrap_err();
    assert!(matches!(again, AuthError::InvalidOrExpiredRefreshToken));
}

#[tokio::test]
async fn ceiling_of_two_evicts_the_oldest_session() {
    let h = harness(2);
    let mut issued = Vec::new();
    for i in 0..3 {
        let at = h.t0 + Duration::seconds(i);
        issued.push(h.sessions.login(&credentials(PASSWORD), IP, at).await.unwrap());
    }

    let now = h.t0 + Duration::seconds(3);
    assert_eq!(h.tokens.active_count_for_user(h.account.id, now).await.unwrap(), 2);

    let oldest = h.tokens.get_by_token(&issued[0].refresh_token).await.unwrap().unwrap();
    assert!(oldest.is_revoked);
    assert!(oldest.replaced_by_token.is_none());
    for session in &issued[1..] {
        let record = h.tokens.get_by_token(&session.refresh_token).await.unwrap().unwrap();
        assert!(record.is_active(now));
    }
}

#[tokio::test]
async fn ceiling_never_exceeded_across_many_logins() {
    let h = harness(3);
    for i in 0..10 {
        let at = h.t0 + Duration::seconds(i);
        h.sessions.login(&credentials(PASSWORD), IP, at).await.unwrap();
        let active = h.tokens.active_count_for_user(h.account.id, at).await.unwrap();
        assert!(active <= 3, "login {i} left {active} active tokens");
    }

    let sessions = h
        .sessions
        .active_sessions(h.account.id, h.t0 + Duration::seconds(10))
        .await
        .unwrap();
    assert_eq!(sessions.len(), 3);
    assert!(sessions.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    assert_eq!(sessions[0].created_at, h.t0 + Duration::seconds(7));
}

#[tokio::test]
async fn logout_revokes_everything_and_is_idempotent() {
    let h = harness(5);
    let a = h.sessions.login(&credentials(PASSWORD), IP, h.t0).await.unwrap();
    h.sessions
        .login(&credentials(PASSWORD), IP, h.t0 + Duration::seconds(1))
        .await
        .unwrap();

    let now = h.t0 + Duration::minutes(1);
    assert_eq!(h.sessions.logout(h.account.id, IP, now).await.unwrap(), 2);
    assert_eq!(h.sessions.logout(h.account.id, IP, now).await.unwrap(), 0);
    assert!(h.sessions.active_sessions(h.account.id, now).await.unwrap().is_empty());

    let err = h
        .sessions
        .refresh(&a.access_token, &a.refresh_token, IP, now)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidOrExpiredRefreshToken));

    let history = h.tokens.all_for_user(h.account.id).unwrap();
    assert!(history.iter().all(|t| t.is_revoked && t.revoked_by_ip.as_deref() == IP));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshes_of_one_token_have_a_single_winner() {
    let h = harness(10);
    let session = h.sessions.login(&credentials(PASSWORD), IP, h.t0).await.unwrap();
    let at = h.t0 + Duration::minutes(1);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sessions = Arc::clone(&h.sessions);
            let access = session.access_token.clone();
            let refresh = session.refresh_token.clone();
            tokio::spawn(async move { sessions.refresh(&access, &refresh, IP, at).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert!(matches!(e, AuthError::InvalidOrExpiredRefreshToken)),
        }
    }
    assert_eq!(winners, 1);

    let original = h.tokens.get_by_token(&session.refresh_token).await.unwrap().unwrap();
    assert!(original.replaced_by_token.is_some());
    assert_eq!(h.tokens.active_count_for_user(h.account.id, at).await.unwrap(), 1);
}

/// Delegates to the in-memory store, counting unknown-account checks and
/// failing every `record_login`.
struct FlakyLoginRecorder {
    inner: Arc<InMemoryUserStore>,
    unknown_checks: AtomicUsize,
}

#[async_trait]
impl UserStore for FlakyLoginRecorder {
    async fn find_by_credential_id(&self, credential_id: &str) -> Result<Option<UserAccount>, StoreError> {
        self.inner.find_by_credential_id(credential_id).await
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserAccount>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn check_password(&self, user: &UserAccount, password: &str) -> Result<PasswordCheck, StoreError> {
        self.inner.check_password(user, password).await
    }

    async fn verify_unknown_password(&self, password: &str) -> Result<(), StoreError> {
        self.unknown_checks.fetch_add(1, Ordering::SeqCst);
        self.inner.verify_unknown_password(password).await
    }

    async fn roles(&self, user: &UserAccount) -> Result<Vec<Role>, StoreError> {
        self.inner.roles(user).await
    }

    async fn is_active(&self, user: &UserAccount) -> Result<bool, StoreError> {
        self.inner.is_active(user).await
    }

    async fn record_login(&self, _user: &UserAccount, _at: DateTime<Utc>) -> Result<(), StoreError> {
        Err(StoreError::Backend("audit table unavailable".to_string()))
    }
}

fn flaky_harness() -> (Harness, Arc<FlakyLoginRecorder>, SessionManager) {
    let h = harness(5);
    let users = Arc::new(FlakyLoginRecorder {
        inner: h.users.clone(),
        unknown_checks: AtomicUsize::new(0),
    });
    let sessions = SessionManager::new(
        users.clone(),
        h.tokens.clone(),
        TokenIssuer::new(settings("integration-test-secret")),
        5,
    );
    (h, users, sessions)
}

#[tokio::test]
async fn unknown_credential_id_still_pays_for_a_password_check() {
    let (h, users, sessions) = flaky_harness();

    let err = sessions
        .login(
            &Credentials {
                credential_id: "mallory@example.com".to_string(),
                password: PASSWORD.to_string(),
            },
            IP,
            h.t0,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials));
    assert_eq!(users.unknown_checks.load(Ordering::SeqCst), 1);

    // Known accounts go through the real check instead.
    let _ = sessions.login(&credentials("nope"), IP, h.t0).await;
    assert_eq!(users.unknown_checks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_login_bookkeeping_does_not_fail_the_login() {
    let (h, _users, sessions) = flaky_harness();

    let session = sessions.login(&credentials(PASSWORD), IP, h.t0).await.unwrap();

    let record = h.tokens.get_by_token(&session.refresh_token).await.unwrap().unwrap();
    assert!(record.is_active(h.t0));
    assert_eq!(h.tokens.active_count_for_user(h.account.id, h.t0).await.unwrap(), 1);
    assert_eq!(h.users.last_login(h.account.id).unwrap(), None);

    // The issued pair is usable.
    let rotated = sessions
        .refresh(&session.access_token, &session.refresh_token, IP, h.t0)
        .await
        .unwrap();
    assert_ne!(rotated.refresh_token, session.refresh_token);
}
