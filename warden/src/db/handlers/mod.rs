//! Repository implementations for the user datastore.
//!
//! All implementations satisfy the [`UserRepository`] trait:
//!
//! - [`PgUsers`]: PostgreSQL-backed users table
//! - [`MemoryUsers`]: in-process map, for development setups and tests

pub mod memory;
pub mod repository;
pub mod users;

pub use memory::MemoryUsers;
pub use repository::UserRepository;
pub use users::PgUsers;
