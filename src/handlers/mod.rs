//! API handlers for the booking backend

pub mod admin;
pub mod auth;
pub mod availability;
pub mod bookings;
pub mod health;
pub mod payments;

// Re-export AuthenticatedUser from middleware for handler use
pub use crate::middleware::auth::{AdminUser, AuthenticatedUser, OptionalUser};
