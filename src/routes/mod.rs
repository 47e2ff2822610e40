//! Route definitions for the booking API

mod admin;
mod auth;
mod bookings;
mod payments;

pub use admin::admin_routes;
pub use auth::auth_routes;
pub use bookings::booking_routes;
pub use payments::payment_routes;
