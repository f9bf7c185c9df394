//! HTTP request handlers for all API endpoints.

pub mod auth;
pub mod users;
