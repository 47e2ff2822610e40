//! Booking service layer - creation, reads and admin edits

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::model::{
    AdminBookingUpdate, Booking, BookingDetails, CreateBookingRequest, ListBookingsQuery,
    NewBooking,
};
use super::pricing::{accessories_cost, price_accessories, rental_days, CostBreakdown};
use super::schedule::{generate_booking_id, BusinessClock};
use crate::availability::AvailabilityService;
use crate::error::{ApiError, ApiResult};
use crate::models::{ResourceClaim, ResourceKind};
use crate::notification::NotificationDispatcher;
use crate::store::BookingStore;

/// Booking service for the booking lifecycle
pub struct BookingService {
    pub(super) store: Arc<dyn BookingStore>,
    pub(super) availability: Arc<AvailabilityService>,
    pub(super) clock: BusinessClock,
    pub(super) notifier: NotificationDispatcher,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        availability: Arc<AvailabilityService>,
        clock: BusinessClock,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            availability,
            clock,
            notifier,
        }
    }

    pub fn clock(&self) -> &BusinessClock {
        &self.clock
    }

    /// Create a booking for `user_id`.
    ///
    /// Validation and capacity checks run before anything is written. The
    /// store then re-checks capacity and writes profile, booking and
    /// accessory lines in one transaction, so a failure leaves no trace.
    pub async fn create_booking(
        &self,
        user_id: Uuid,
        request: CreateBookingRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<BookingDetails> {
        request.validate()?;
        request.check().map_err(ApiError::InvalidInput)?;

        if request.pickup_date < self.clock.today(now) {
            return Err(ApiError::InvalidInput(
                "Pickup date is in the past".to_string(),
            ));
        }

        let booking_id = generate_booking_id(&self.clock, now);

        let cycle_units = self
            .availability
            .check_availability(
                request.cycle_id,
                ResourceKind::Cycle,
                request.pickup_date,
                request.return_date,
            )
            .await?;
        if cycle_units < 1 {
            return Err(ApiError::ResourceUnavailable(
                "Cycle is not available for the selected dates".to_string(),
            ));
        }

        let mut claims = vec![ResourceClaim::cycle(request.cycle_id)];
        for selection in &request.accessories {
            let units = self
                .availability
                .check_availability(
                    selection.accessory_id,
                    ResourceKind::Accessory,
                    request.pickup_date,
                    request.return_date,
                )
                .await?;
            if units < selection.quantity {
                return Err(ApiError::ResourceUnavailable(format!(
                    "Accessory {} is not available for the selected dates",
                    selection.accessory_id
                )));
            }
            claims.push(ResourceClaim::accessory(
                selection.accessory_id,
                selection.quantity,
            ));
        }

        let days = rental_days(request.pickup_date, request.return_date);
        let lines = price_accessories(&request.accessories, days);
        let costs = CostBreakdown::compute(
            request.cycle_rental_cost,
            accessories_cost(&lines),
            request.insurance_cost,
            request.security_deposit,
            request.discount_amount,
        );
        costs.check().map_err(ApiError::InvalidInput)?;

        let profile = request.profile.into_profile(user_id, now);
        let new_booking = NewBooking {
            id: Uuid::new_v4(),
            booking_id,
            user_id,
            cycle_id: request.cycle_id,
            partner_id: request.partner_id,
            pickup_date: request.pickup_date,
            pickup_time: request.pickup_time,
            return_date: request.return_date,
            return_time: request.return_time,
            costs,
            created_at: now,
        };

        let details = self
            .store
            .create_booking(new_booking, profile, lines, &claims)
            .await?;

        tracing::info!(
            booking_id = %details.booking.booking_id,
            user_id = %user_id,
            total = %details.booking.total_amount,
            accessories = details.accessories.len(),
            "Booking created"
        );

        Ok(details)
    }

    /// A booking owned by `user_id`, or NotFound
    pub(super) async fn owned_booking(&self, user_id: Uuid, booking_id: &str) -> ApiResult<Booking> {
        self.store
            .find_user_booking(booking_id, user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Booking not found".to_string()))
    }

    pub async fn get_booking(&self, user_id: Uuid, booking_id: &str) -> ApiResult<BookingDetails> {
        let booking = self.owned_booking(user_id, booking_id).await?;
        let accessories = self.store.accessory_lines(booking.id).await?;
        Ok(BookingDetails {
            booking,
            accessories,
        })
    }

    pub async fn list_bookings(&self, user_id: Uuid) -> ApiResult<Vec<Booking>> {
        Ok(self.store.list_user_bookings(user_id).await?)
    }

    /// All bookings, for the back-office
    pub async fn admin_list(&self, query: &ListBookingsQuery) -> ApiResult<Vec<Booking>> {
        Ok(self.store.list_bookings(query).await?)
    }

    /// Admin edit of statuses and adjustable amounts. GST and total are
    /// recomputed from the resulting breakdown.
    pub async fn admin_update(
        &self,
        booking_id: &str,
        update: AdminBookingUpdate,
        now: DateTime<Utc>,
    ) -> ApiResult<Booking> {
        let mut booking = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Booking not found".to_string()))?;

        let amounts = [
            ("insurance_cost", update.insurance_cost),
            ("security_deposit", update.security_deposit),
            ("discount_amount", update.discount_amount),
        ];
        for (name, value) in amounts {
            if value.map_or(false, |v| v < Decimal::ZERO) {
                return Err(ApiError::InvalidInput(format!("{} must not be negative", name)));
            }
        }

        let current = booking.costs();
        let costs = CostBreakdown::compute(
            current.cycle_rental_cost,
            current.accessories_cost,
            update.insurance_cost.unwrap_or(current.insurance_cost),
            update.security_deposit.unwrap_or(current.security_deposit),
            update.discount_amount.unwrap_or(current.discount_amount),
        );
        costs.check().map_err(ApiError::InvalidInput)?;

        if let Some(status) = update.booking_status {
            booking.booking_status = status;
        }
        if let Some(status) = update.payment_status {
            booking.payment_status = status;
        }
        booking.apply_costs(&costs);
        booking.updated_at = now;

        let updated = self.store.update_booking(&booking).await?;

        tracing::info!(
            booking_id = %updated.booking_id,
            booking_status = ?updated.booking_status,
            payment_status = ?updated.payment_status,
            total = %updated.total_amount,
            "Booking updated by admin"
        );

        Ok(updated)
    }
}
