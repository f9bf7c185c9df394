//! Datastore models.

pub mod users;
