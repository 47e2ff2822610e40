//! Phone OTP routes

use axum::{routing::post, Router};

use crate::handlers::auth::{send_otp, verify_otp};
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/otp/send", post(send_otp))
        .route("/api/auth/otp/verify", post(verify_otp))
}
