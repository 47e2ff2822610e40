//! Accessory revisions on an existing booking

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use super::model::{
    check_selections, BookingStatus, CancellationStatus, ModifyAccessoriesRequest,
    ModifyAccessoriesResponse,
};
use super::pricing::{accessories_cost, price_accessories, rental_days};
use super::schedule::{edit_window_open, EDIT_CUTOFF_HOURS};
use super::service::BookingService;
use crate::error::{ApiError, ApiResult};
use crate::models::ResourceClaim;
use crate::notification::NotificationKind;

impl BookingService {
    /// Replace a booking's accessories and re-price it.
    ///
    /// Only accessories whose quantity grows are re-claimed against capacity.
    /// The price difference is computed here; a differing client figure is
    /// logged and ignored.
    pub async fn revise_accessories(
        &self,
        user_id: Uuid,
        request: ModifyAccessoriesRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<ModifyAccessoriesResponse> {
        request.validate()?;
        check_selections(&request.accessories).map_err(ApiError::InvalidInput)?;

        let booking = self.owned_booking(user_id, &request.booking_id).await?;

        if booking.booking_status == BookingStatus::Cancelled
            || booking.cancellation_status == Some(CancellationStatus::Requested)
        {
            return Err(ApiError::InvalidInput(
                "Cancelled bookings cannot be modified".to_string(),
            ));
        }

        let pickup_at = self.clock.to_utc(booking.pickup_date, booking.pickup_time);
        if !edit_window_open(pickup_at, now) {
            return Err(ApiError::EditWindowClosed(format!(
                "Bookings can only be modified more than {} hours before pickup",
                EDIT_CUTOFF_HOURS
            )));
        }

        let current_lines = self.store.accessory_lines(booking.id).await?;
        let mut held: HashMap<Uuid, i32> = HashMap::new();
        for line in &current_lines {
            *held.entry(line.accessory_id).or_insert(0) += line.quantity;
        }
        let claims: Vec<ResourceClaim> = request
            .accessories
            .iter()
            .filter(|selection| {
                let already = held.get(&selection.accessory_id).copied().unwrap_or(0);
                selection.quantity > already
            })
            .map(|selection| ResourceClaim::accessory(selection.accessory_id, selection.quantity))
            .collect();

        let days = rental_days(booking.pickup_date, booking.return_date);
        let lines = price_accessories(&request.accessories, days);
        let costs = booking.costs().with_accessories_cost(accessories_cost(&lines));
        costs.check().map_err(ApiError::InvalidInput)?;

        let price_difference = costs.total() - booking.total_amount;
        if let Some(client_difference) = request.price_difference {
            if client_difference != price_difference {
                tracing::warn!(
                    booking_id = %booking.booking_id,
                    client = %client_difference,
                    computed = %price_difference,
                    "Client price difference does not match, using computed value"
                );
            }
        }

        let updated = self
            .store
            .replace_accessories(&booking, &costs, lines, &claims, now)
            .await?;

        tracing::info!(
            booking_id = %updated.booking_id,
            accessories_cost = %updated.accessories_cost,
            total = %updated.total_amount,
            price_difference = %price_difference,
            "Booking accessories revised"
        );

        self.notifier
            .notify(NotificationKind::AdminModification, &updated.booking_id);

        let message = if price_difference.is_sign_positive() && !price_difference.is_zero() {
            format!("Booking updated. Additional payment of Rs. {} is due", price_difference)
        } else {
            "Booking updated successfully".to_string()
        };

        Ok(ModifyAccessoriesResponse {
            success: true,
            price_difference,
            message,
        })
    }
}
