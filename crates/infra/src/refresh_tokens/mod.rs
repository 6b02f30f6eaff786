//! Refresh-token persistence.
//!
//! Both stores key records by token string and implement rotation as a
//! compare-and-set on the record's revocation state.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryRefreshTokenStore;
pub use postgres::PostgresRefreshTokenStore;
