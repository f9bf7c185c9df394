//! User datastore access.
//!
//! - [`errors`]: datastore error type and sqlx error categorization
//! - [`handlers`]: the [`handlers::UserRepository`] trait and its implementations
//! - [`models`]: the user record

pub mod errors;
pub mod handlers;
pub mod models;
