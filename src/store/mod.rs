//! Persistence interfaces for bookings, profiles and OTP rate limits
//!
//! Services talk to these traits only. `PgStore` backs production; `MemoryStore`
//! backs tests and local development.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::booking::{
    Booking, BookingAccessoryLine, BookingDetails, BookingStatus, CancellationQuote,
    CostBreakdown, ListBookingsQuery, NewAccessoryLine, NewBooking, PaymentStatus,
};
use crate::models::{Profile, ResourceClaim, ResourceKind};
use crate::payment::{PaymentOrder, PaymentRecord};

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{} {} is not available for the selected dates", .0.kind.as_str(), .0.resource_id)]
    Unavailable(ResourceClaim),

    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a conditional payment-completion write
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentTransition {
    /// The booking moved to `completed` with this call
    Applied(Booking),
    /// The booking was already completed; nothing was written
    AlreadyCompleted(Booking),
    /// The booking is cancelled or refunded; nothing was written
    Closed(Booking),
}

impl PaymentTransition {
    /// Classify a booking the completion write did not match
    pub fn unchanged(current: Booking) -> Self {
        if current.payment_status == PaymentStatus::Completed
            && current.booking_status != BookingStatus::Cancelled
        {
            PaymentTransition::AlreadyCompleted(current)
        } else {
            PaymentTransition::Closed(current)
        }
    }

    pub fn booking(&self) -> &Booking {
        match self {
            PaymentTransition::Applied(booking)
            | PaymentTransition::AlreadyCompleted(booking)
            | PaymentTransition::Closed(booking) => booking,
        }
    }

    pub fn into_booking(self) -> Booking {
        match self {
            PaymentTransition::Applied(booking)
            | PaymentTransition::AlreadyCompleted(booking)
            | PaymentTransition::Closed(booking) => booking,
        }
    }
}

/// Whether a completion write may still apply to a booking
fn accepts_completion(booking: &Booking) -> bool {
    matches!(
        booking.payment_status,
        PaymentStatus::Pending | PaymentStatus::Failed
    ) && booking.booking_status != BookingStatus::Cancelled
}

/// Remaining capacity of rentable resources
#[async_trait]
pub trait CapacitySource: Send + Sync {
    /// Units of the resource still free over `[pickup_date, return_date]`.
    /// Anything below 1 means unavailable.
    async fn available_units(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        pickup_date: NaiveDate,
        return_date: NaiveDate,
    ) -> StoreResult<i32>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>>;

    /// Persist a booking with its accessory lines in one atomic unit.
    ///
    /// Every claim is re-checked against remaining capacity while holding a
    /// per-resource lock. The profile is inserted only when none exists for
    /// its id. Any failure leaves nothing behind.
    async fn create_booking(
        &self,
        booking: NewBooking,
        profile: Profile,
        lines: Vec<NewAccessoryLine>,
        claims: &[ResourceClaim],
    ) -> StoreResult<BookingDetails>;

    /// Look up a booking by its human-readable reference
    async fn find_booking(&self, booking_id: &str) -> StoreResult<Option<Booking>>;

    /// Look up a booking by reference, scoped to its owner
    async fn find_user_booking(
        &self,
        booking_id: &str,
        user_id: Uuid,
    ) -> StoreResult<Option<Booking>>;

    /// Bookings owned by `user_id`, newest first
    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>>;

    /// All bookings matching the query filters, newest first
    async fn list_bookings(&self, query: &ListBookingsQuery) -> StoreResult<Vec<Booking>>;

    async fn accessory_lines(&self, booking_row_id: Uuid) -> StoreResult<Vec<BookingAccessoryLine>>;

    /// Swap the accessory lines of a booking and write its new costs.
    ///
    /// Old lines are removed before `claims` are checked, so each claim must
    /// fit in the capacity left by every other booking. An unpaid booking
    /// whose total changes loses its current order.
    async fn replace_accessories(
        &self,
        booking: &Booking,
        costs: &CostBreakdown,
        lines: Vec<NewAccessoryLine>,
        claims: &[ResourceClaim],
        now: DateTime<Utc>,
    ) -> StoreResult<Booking>;

    /// Add an order to the booking's history and make it the current one
    async fn record_payment_order(&self, order: &PaymentOrder) -> StoreResult<Booking>;

    /// An order from the booking's history
    async fn find_payment_order(
        &self,
        booking_row_id: Uuid,
        order_id: &str,
    ) -> StoreResult<Option<PaymentOrder>>;

    /// Every order raised for a booking, newest first
    async fn payment_orders(&self, booking_row_id: Uuid) -> StoreResult<Vec<PaymentOrder>>;

    /// The completed or refunded booking settled by a gateway transaction
    async fn find_settled_by_transaction(
        &self,
        transaction_id: &str,
    ) -> StoreResult<Option<Booking>>;

    /// Mark a pending or failed payment completed and confirm the booking.
    /// Cancelled and refunded bookings are left alone.
    async fn complete_payment(
        &self,
        booking_row_id: Uuid,
        record: &PaymentRecord,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentTransition>;

    /// Mark a still-pending payment failed. `None` when it was not pending.
    async fn fail_payment(
        &self,
        booking_row_id: Uuid,
        record: &PaymentRecord,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Booking>>;

    /// Record a cancellation request. `None` when the booking is cancelled or
    /// already has an open request.
    async fn request_cancellation(
        &self,
        booking_row_id: Uuid,
        reason: &str,
        quote: &CancellationQuote,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Booking>>;

    /// Settle an open cancellation request. `None` when there is none.
    async fn resolve_cancellation(
        &self,
        booking_row_id: Uuid,
        approve: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Booking>>;

    /// Write statuses and cost fields of an admin-edited booking
    async fn update_booking(&self, booking: &Booking) -> StoreResult<Booking>;

    /// Unpaid bookings with a gateway order untouched since `updated_before`
    async fn pending_payments(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Booking>>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count an OTP issuance for `phone_number` unless it is already at `limit`
    /// within the current window.
    ///
    /// The window restarts once `window` has elapsed since its first attempt.
    /// Returns the attempt count after recording, or `None` when limited.
    async fn reserve_attempt(
        &self,
        phone_number: &str,
        limit: i32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i32>>;
}

/// Claims sorted by lock key, so concurrent writers lock in the same order
fn ordered_claims(claims: &[ResourceClaim]) -> Vec<ResourceClaim> {
    let mut ordered = claims.to_vec();
    ordered.sort_by_key(|claim| claim.lock_key());
    ordered
}
