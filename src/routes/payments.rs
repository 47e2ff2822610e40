//! Payment routes

use axum::{routing::post, Router};

use crate::handlers::payments::{create_order, verify_payment, verify_signature};
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/api/payments/orders", post(create_order))
        .route("/api/payments/verify", post(verify_payment))
        .route("/api/payments/razorpay/verify", post(verify_signature))
}
