//! Back-office routes

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::admin::{decide_cancellation, list_bookings, update_booking};
use crate::state::AppState;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/bookings", get(list_bookings))
        .route("/api/admin/bookings/:booking_id", patch(update_booking))
        .route(
            "/api/admin/bookings/:booking_id/cancellation",
            post(decide_cancellation),
        )
}
