//! Middleware for the booking API
//!
//! Request tracing and session authentication.

pub mod auth;
mod tracing;

pub use auth::{AdminUser, AuthenticatedUser, OptionalUser};
pub use tracing::{request_tracing, REQUEST_ID_HEADER};
