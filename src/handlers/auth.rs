//! Phone OTP HTTP handlers

use axum::{extract::State, Json};
use chrono::Utc;

use crate::auth::{OtpResponse, SendOtpRequest, VerifyOtpRequest};
use crate::error::ApiResult;
use crate::state::AppState;

/// POST /api/auth/otp/send - Send a one-time code to a phone number
pub async fn send_otp(
    State(state): State<AppState>,
    Json(req): Json<SendOtpRequest>,
) -> ApiResult<Json<OtpResponse>> {
    state
        .otp_service
        .request_code(req.phone_number.trim(), Utc::now())
        .await?;

    Ok(Json(OtpResponse {
        success: true,
        status: Some("pending".to_string()),
        message: Some("OTP sent successfully".to_string()),
        session: None,
        user: None,
    }))
}

/// POST /api/auth/otp/verify - Check a code and sign the phone in
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> ApiResult<Json<OtpResponse>> {
    let outcome = state
        .otp_service
        .verify_code(req.phone_number.trim(), req.code.trim())
        .await?;

    Ok(Json(outcome.into()))
}
