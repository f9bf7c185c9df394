//! API request and response data models.

pub mod auth;
pub mod users;
