//! Back-office booking handlers (admin only)

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;

use super::AdminUser;
use crate::booking::{AdminBookingUpdate, Booking, CancellationDecisionRequest, ListBookingsQuery};
use crate::error::ApiResult;
use crate::state::AppState;

/// GET /api/admin/bookings
pub async fn list_bookings(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<ListBookingsQuery>,
) -> ApiResult<Json<Vec<Booking>>> {
    let bookings = state.booking_service.admin_list(&query).await?;
    Ok(Json(bookings))
}

/// PATCH /api/admin/bookings/:booking_id
pub async fn update_booking(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(booking_id): Path<String>,
    Json(update): Json<AdminBookingUpdate>,
) -> ApiResult<Json<Booking>> {
    tracing::info!(admin_id = %admin.user_id, booking_id = %booking_id, "Admin booking edit");
    let booking = state
        .booking_service
        .admin_update(&booking_id, update, Utc::now())
        .await?;
    Ok(Json(booking))
}

/// POST /api/admin/bookings/:booking_id/cancellation - Approve or reject
pub async fn decide_cancellation(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(booking_id): Path<String>,
    Json(decision): Json<CancellationDecisionRequest>,
) -> ApiResult<Json<Booking>> {
    tracing::info!(
        admin_id = %admin.user_id,
        booking_id = %booking_id,
        approve = decision.approve,
        "Admin cancellation decision"
    );
    let booking = state
        .booking_service
        .resolve_cancellation(&booking_id, decision.approve, Utc::now())
        .await?;
    Ok(Json(booking))
}
