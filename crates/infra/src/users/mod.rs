//! User accounts: password hashing and the in-memory account store.

pub mod in_memory;
pub mod password;

pub use in_memory::{InMemoryUserStore, LockoutPolicy, NewUser};
pub use password::PasswordHasherConfig;
