use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role name carried in access tokens (one `roles` entry per role).
///
/// Roles never grant anything on their own: permission claims attached to a
/// role live in the external role store and are resolved per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMINISTRATOR: Role = Role(Cow::Borrowed("Administrator"));
    pub const USER: Role = Role(Cow::Borrowed("User"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Role {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
