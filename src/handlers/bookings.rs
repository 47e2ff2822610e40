//! Customer booking handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use validator::Validate;

use super::AuthenticatedUser;
use crate::booking::{
    Booking, BookingDetails, CancelBookingRequest, CancellationQuote, CreateBookingRequest,
    ModifyAccessoriesRequest, ModifyAccessoriesResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

/// POST /api/bookings - Create a booking
pub async fn create_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateBookingRequest>,
) -> ApiResult<(StatusCode, Json<BookingDetails>)> {
    let details = state
        .booking_service
        .create_booking(user.user_id, req, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /api/bookings - The caller's bookings
pub async fn list_bookings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<Booking>>> {
    let bookings = state.booking_service.list_bookings(user.user_id).await?;
    Ok(Json(bookings))
}

/// GET /api/bookings/:booking_id
pub async fn get_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<String>,
) -> ApiResult<Json<BookingDetails>> {
    let details = state
        .booking_service
        .get_booking(user.user_id, &booking_id)
        .await?;
    Ok(Json(details))
}

/// POST /api/bookings/modify - Replace a booking's accessories
pub async fn modify_accessories(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<ModifyAccessoriesRequest>,
) -> ApiResult<Json<ModifyAccessoriesResponse>> {
    let response = state
        .booking_service
        .revise_accessories(user.user_id, req, Utc::now())
        .await?;
    Ok(Json(response))
}

/// GET /api/bookings/:booking_id/cancellation-quote
pub async fn cancellation_quote(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<String>,
) -> ApiResult<Json<CancellationQuote>> {
    let quote = state
        .booking_service
        .cancellation_quote(user.user_id, &booking_id, Utc::now())
        .await?;
    Ok(Json(quote))
}

/// POST /api/bookings/:booking_id/cancel - Ask for a cancellation
pub async fn request_cancellation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<String>,
    Json(req): Json<CancelBookingRequest>,
) -> ApiResult<Json<Booking>> {
    req.validate()?;
    let booking = state
        .booking_service
        .request_cancellation(user.user_id, &booking_id, &req.reason, Utc::now())
        .await?;
    Ok(Json(booking))
}
