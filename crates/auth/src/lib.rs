//! `keyward-auth`: session lifecycle and permission authorization.
//!
//! This crate is intentionally decoupled from HTTP and storage: persistence
//! sits behind the traits in [`store`].

pub mod authorize;
pub mod builtin;
pub mod catalog;
pub mod claims;
pub mod error;
pub mod permission;
pub mod policy;
pub mod refresh_token;
pub mod roles;
pub mod session;
pub mod store;
pub mod token;

pub use authorize::{
    AuthorizationExplanation, Authorizer, AuthzError, Decision, PermissionClaims, evaluate,
};
pub use catalog::PermissionCatalog;
pub use claims::{AccessTokenClaims, TokenValidationError, validate_lifetime};
pub use error::{AuthError, RefreshRejection};
pub use permission::{PermissionDefinition, PermissionModule};
pub use policy::{CompositePolicy, PolicyResolver, Requirement};
pub use refresh_token::{ExpectedState, RefreshToken, Revocation};
pub use roles::Role;
pub use session::{AuthSession, Credentials, PrincipalSummary, SessionManager, SessionSummary};
pub use store::{
    PasswordCheck, RefreshTokenStore, RolePermissionSource, StoreError, UserAccount, UserStore,
};
pub use token::{AccessToken, TokenError, TokenIssuer, TokenSettings};
