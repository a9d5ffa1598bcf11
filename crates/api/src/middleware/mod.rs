//! Request middleware.

pub mod auth;

pub use auth::{CurrentActor, auth_middleware};
