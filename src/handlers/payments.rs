//! Payment handlers

use axum::{extract::State, Json};
use chrono::Utc;

use super::{AuthenticatedUser, OptionalUser};
use crate::error::ApiResult;
use crate::payment::{
    CreateOrderRequest, CreateOrderResponse, SignatureVerifyRequest, SignatureVerifyResponse,
    VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::state::AppState;

/// POST /api/payments/orders - Create a gateway order for a booking
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Json<CreateOrderResponse>> {
    let response = state
        .payment_service
        .create_order(user.user_id, req, Utc::now())
        .await?;
    Ok(Json(response))
}

/// POST /api/payments/verify - Poll the gateway for a redirect checkout
///
/// Session optional: the customer may land here from the gateway's redirect
/// without one. When a session is sent, the booking must be its user's.
pub async fn verify_payment(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Json(req): Json<VerifyPaymentRequest>,
) -> ApiResult<Json<VerifyPaymentResponse>> {
    let response = state
        .payment_service
        .verify_redirect(user.map(|u| u.user_id), req, Utc::now())
        .await?;
    Ok(Json(response))
}

/// POST /api/payments/razorpay/verify - Check a signed checkout result
pub async fn verify_signature(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Json(req): Json<SignatureVerifyRequest>,
) -> ApiResult<Json<SignatureVerifyResponse>> {
    let response = state
        .payment_service
        .verify_signature(user.map(|u| u.user_id), req, Utc::now())
        .await?;
    Ok(Json(response))
}
