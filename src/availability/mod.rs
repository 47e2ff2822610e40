//! Remaining-capacity checks for cycles and accessories

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::ResourceKind;
use crate::store::CapacitySource;

/// Query parameters for an availability lookup
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub resource_id: Uuid,
    pub kind: ResourceKind,
    pub pickup_date: NaiveDate,
    pub return_date: NaiveDate,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AvailabilityResponse {
    pub remaining_units: i32,
    pub available: bool,
}

pub struct AvailabilityService {
    capacity: Arc<dyn CapacitySource>,
}

impl AvailabilityService {
    pub fn new(capacity: Arc<dyn CapacitySource>) -> Self {
        Self { capacity }
    }

    /// Units still free for the date range; below 1 means unavailable
    pub async fn check_availability(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
        pickup_date: NaiveDate,
        return_date: NaiveDate,
    ) -> ApiResult<i32> {
        if return_date < pickup_date {
            return Err(ApiError::InvalidInput(
                "return_date must not be before pickup_date".to_string(),
            ));
        }

        let remaining = self
            .capacity
            .available_units(kind, resource_id, pickup_date, return_date)
            .await?;

        tracing::debug!(
            resource_id = %resource_id,
            kind = kind.as_str(),
            remaining,
            "Availability checked"
        );

        Ok(remaining)
    }

    pub async fn lookup(&self, query: &AvailabilityQuery) -> ApiResult<AvailabilityResponse> {
        let remaining_units = self
            .check_availability(
                query.resource_id,
                query.kind,
                query.pickup_date,
                query.return_date,
            )
            .await?;

        Ok(AvailabilityResponse {
            remaining_units: remaining_units.max(0),
            available: remaining_units >= 1,
        })
    }
}
