//! Availability handler

use axum::{
    extract::{Query, State},
    Json,
};

use crate::availability::{AvailabilityQuery, AvailabilityResponse};
use crate::error::ApiResult;
use crate::state::AppState;

/// GET /api/availability?resource_id&kind&pickup_date&return_date
pub async fn check_availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<Json<AvailabilityResponse>> {
    let response = state.availability_service.lookup(&query).await?;
    Ok(Json(response))
}
