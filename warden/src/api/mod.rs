//! HTTP API layer.
//!
//! - [`handlers`]: route handlers
//! - [`models`]: request and response bodies
//!
//! Routes are assembled in [`crate::build_router`].

pub mod handlers;
pub mod models;
