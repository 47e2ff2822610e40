//! Cancellation fees and the customer/admin cancellation workflow

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::model::{Booking, BookingStatus, CancellationStatus};
use super::schedule::FREE_CANCELLATION_HOURS;
use super::service::BookingService;
use crate::error::{ApiError, ApiResult};

/// Flat fee charged for cancellations made well ahead of pickup
pub const CANCELLATION_FEE: Decimal = Decimal::ONE_HUNDRED;

/// Fee and refund for cancelling a booking at a given moment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CancellationQuote {
    /// Whole hours left until pickup, negative once pickup has passed
    pub hours_until_pickup: i64,
    pub cancellation_fee: Decimal,
    pub refund_amount: Decimal,
}

/// At least 24 hours ahead: flat fee, rest refunded. Later: no refund.
pub fn cancellation_quote(
    pickup_at: DateTime<Utc>,
    now: DateTime<Utc>,
    total_amount: Decimal,
) -> CancellationQuote {
    let until_pickup = pickup_at - now;

    let (fee, refund) = if until_pickup >= Duration::hours(FREE_CANCELLATION_HOURS) {
        let fee = CANCELLATION_FEE.min(total_amount);
        (fee, total_amount - fee)
    } else {
        (total_amount, Decimal::ZERO)
    };

    CancellationQuote {
        hours_until_pickup: until_pickup.num_hours(),
        cancellation_fee: fee,
        refund_amount: refund,
    }
}

fn ensure_cancellable(booking: &Booking) -> ApiResult<()> {
    if booking.booking_status == BookingStatus::Cancelled {
        return Err(ApiError::InvalidInput(
            "Booking is already cancelled".to_string(),
        ));
    }
    if booking.cancellation_status == Some(CancellationStatus::Requested) {
        return Err(ApiError::InvalidInput(
            "A cancellation request is already pending".to_string(),
        ));
    }
    Ok(())
}

impl BookingService {
    /// Advisory fee/refund for cancelling now; nothing is written
    pub async fn cancellation_quote(
        &self,
        user_id: uuid::Uuid,
        booking_id: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<CancellationQuote> {
        let booking = self.owned_booking(user_id, booking_id).await?;
        ensure_cancellable(&booking)?;

        let pickup_at = self.clock.to_utc(booking.pickup_date, booking.pickup_time);
        Ok(cancellation_quote(pickup_at, now, booking.total_amount))
    }

    /// Record a cancellation request with the fee and refund computed now.
    /// Final disposition is left to an admin.
    pub async fn request_cancellation(
        &self,
        user_id: uuid::Uuid,
        booking_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<Booking> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ApiError::InvalidInput(
                "A cancellation reason is required".to_string(),
            ));
        }

        let booking = self.owned_booking(user_id, booking_id).await?;
        ensure_cancellable(&booking)?;

        let pickup_at = self.clock.to_utc(booking.pickup_date, booking.pickup_time);
        let quote = cancellation_quote(pickup_at, now, booking.total_amount);

        let updated = self
            .store
            .request_cancellation(booking.id, reason, &quote, now)
            .await?
            .ok_or_else(|| {
                ApiError::InvalidInput("Booking can no longer be cancelled".to_string())
            })?;

        tracing::info!(
            booking_id = %updated.booking_id,
            fee = %quote.cancellation_fee,
            refund = %quote.refund_amount,
            "Cancellation requested"
        );

        Ok(updated)
    }

    /// Admin decision on an open cancellation request
    pub async fn resolve_cancellation(
        &self,
        booking_id: &str,
        approve: bool,
        now: DateTime<Utc>,
    ) -> ApiResult<Booking> {
        let booking = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Booking not found".to_string()))?;

        let updated = self
            .store
            .resolve_cancellation(booking.id, approve, now)
            .await?
            .ok_or_else(|| {
                ApiError::InvalidInput("No pending cancellation request".to_string())
            })?;

        tracing::info!(
            booking_id = %updated.booking_id,
            approved = approve,
            payment_status = ?updated.payment_status,
            "Cancellation resolved"
        );

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pickup() -> DateTime<Utc> {
        "2025-06-14T04:30:00Z".parse().unwrap()
    }

    #[test]
    fn test_early_cancellation_pays_flat_fee() {
        let now = pickup() - Duration::hours(30);
        let quote = cancellation_quote(pickup(), now, Decimal::from(1000));
        assert_eq!(quote.cancellation_fee, Decimal::from(100));
        assert_eq!(quote.refund_amount, Decimal::from(900));
        assert_eq!(quote.hours_until_pickup, 30);
    }

    #[test]
    fn test_late_cancellation_forfeits_everything() {
        let now = pickup() - Duration::hours(10);
        let quote = cancellation_quote(pickup(), now, Decimal::from(1000));
        assert_eq!(quote.cancellation_fee, Decimal::from(1000));
        assert_eq!(quote.refund_amount, Decimal::ZERO);
    }

    #[test]
    fn test_exactly_24_hours_is_early() {
        let now = pickup() - Duration::hours(24);
        let quote = cancellation_quote(pickup(), now, Decimal::from(1000));
        assert_eq!(quote.refund_amount, Decimal::from(900));

        let now = now + Duration::seconds(1);
        let quote = cancellation_quote(pickup(), now, Decimal::from(1000));
        assert_eq!(quote.refund_amount, Decimal::ZERO);
    }

    #[test]
    fn test_fee_never_exceeds_total() {
        let now = pickup() - Duration::hours(48);
        let quote = cancellation_quote(pickup(), now, Decimal::from(60));
        assert_eq!(quote.cancellation_fee, Decimal::from(60));
        assert_eq!(quote.refund_amount, Decimal::ZERO);
    }
}
