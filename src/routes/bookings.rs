//! Booking and availability routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::availability::check_availability;
use crate::handlers::bookings::*;
use crate::state::AppState;

pub fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/api/availability", get(check_availability))
        .route("/api/bookings", post(create_booking).get(list_bookings))
        .route("/api/bookings/modify", post(modify_accessories))
        .route("/api/bookings/:booking_id", get(get_booking))
        .route(
            "/api/bookings/:booking_id/cancellation-quote",
            get(cancellation_quote),
        )
        .route("/api/bookings/:booking_id/cancel", post(request_cancellation))
}
