//! In-memory store, used by tests and local development.
//!
//! All state sits behind a single `RwLock`, so every write method is atomic in
//! the same way a Postgres transaction is.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    accepts_completion, ordered_claims, BookingStore, CapacitySource, PaymentTransition,
    RateLimitStore, StoreError, StoreResult,
};
use crate::booking::{
    Booking, BookingAccessoryLine, BookingDetails, BookingStatus, CancellationQuote,
    CancellationStatus, CostBreakdown, ListBookingsQuery, NewAccessoryLine, NewBooking,
    PaymentStatus,
};
use crate::models::{Profile, RateLimitRecord, ResourceClaim, ResourceKind};
use crate::payment::{PaymentOrder, PaymentRecord};

#[derive(Debug, Default)]
struct MemoryState {
    cycles: HashMap<Uuid, i32>,
    accessories: HashMap<Uuid, i32>,
    profiles: HashMap<Uuid, Profile>,
    bookings: HashMap<Uuid, Booking>,
    lines: HashMap<Uuid, Vec<BookingAccessoryLine>>,
    orders: HashMap<Uuid, Vec<PaymentOrder>>,
    rate_limits: HashMap<String, RateLimitRecord>,
}

impl MemoryState {
    fn holds_capacity(booking: &Booking, pickup_date: NaiveDate, return_date: NaiveDate) -> bool {
        matches!(
            booking.booking_status,
            BookingStatus::Confirmed | BookingStatus::Active
        ) && booking.pickup_date <= return_date
            && booking.return_date >= pickup_date
    }

    fn available_units(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        pickup_date: NaiveDate,
        return_date: NaiveDate,
    ) -> i32 {
        let overlapping = self
            .bookings
            .values()
            .filter(|booking| Self::holds_capacity(booking, pickup_date, return_date));

        match kind {
            ResourceKind::Cycle => {
                let total = self.cycles.get(&resource_id).copied().unwrap_or(0);
                let held = overlapping
                    .filter(|booking| booking.cycle_id == resource_id)
                    .count() as i32;
                total - held
            }
            ResourceKind::Accessory => {
                let total = self.accessories.get(&resource_id).copied().unwrap_or(0);
                let held: i32 = overlapping
                    .filter_map(|booking| self.lines.get(&booking.id))
                    .flatten()
                    .filter(|line| line.accessory_id == resource_id)
                    .map(|line| line.quantity)
                    .sum();
                total - held
            }
        }
    }

    fn check_claims(
        &self,
        claims: &[ResourceClaim],
        pickup_date: NaiveDate,
        return_date: NaiveDate,
    ) -> StoreResult<()> {
        for claim in ordered_claims(claims) {
            let available =
                self.available_units(claim.kind, claim.resource_id, pickup_date, return_date);
            if available < claim.quantity {
                return Err(StoreError::Unavailable(claim));
            }
        }
        Ok(())
    }

    fn booking_mut(&mut self, booking_row_id: Uuid) -> StoreResult<&mut Booking> {
        self.bookings
            .get_mut(&booking_row_id)
            .ok_or(StoreError::NotFound)
    }
}

/// Thread-safe in-memory implementation of every store trait
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cycle model with `quantity` rentable units
    pub async fn add_cycle(&self, cycle_id: Uuid, quantity: i32) {
        self.state.write().await.cycles.insert(cycle_id, quantity);
    }

    /// Register an accessory with `quantity` rentable units
    pub async fn add_accessory(&self, accessory_id: Uuid, quantity: i32) {
        self.state
            .write()
            .await
            .accessories
            .insert(accessory_id, quantity);
    }

    pub async fn insert_profile(&self, profile: Profile) {
        self.state
            .write()
            .await
            .profiles
            .insert(profile.id, profile);
    }

    pub async fn booking_count(&self) -> usize {
        self.state.read().await.bookings.len()
    }

    pub async fn line_count(&self) -> usize {
        self.state.read().await.lines.values().map(Vec::len).sum()
    }

    pub async fn rate_limit(&self, phone_number: &str) -> Option<RateLimitRecord> {
        self.state.read().await.rate_limits.get(phone_number).cloned()
    }

    /// Overwrite `updated_at`, for exercising time-based queries
    pub async fn touch_booking(&self, booking_row_id: Uuid, updated_at: DateTime<Utc>) {
        if let Some(booking) = self.state.write().await.bookings.get_mut(&booking_row_id) {
            booking.updated_at = updated_at;
        }
    }
}

#[async_trait]
impl CapacitySource for MemoryStore {
    async fn available_units(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        pickup_date: NaiveDate,
        return_date: NaiveDate,
    ) -> StoreResult<i32> {
        let state = self.state.read().await;
        Ok(state.available_units(kind, resource_id, pickup_date, return_date))
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn find_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(self.state.read().await.profiles.get(&user_id).cloned())
    }

    async fn create_booking(
        &self,
        booking: NewBooking,
        profile: Profile,
        lines: Vec<NewAccessoryLine>,
        claims: &[ResourceClaim],
    ) -> StoreResult<BookingDetails> {
        let mut state = self.state.write().await;
        state.check_claims(claims, booking.pickup_date, booking.return_date)?;

        let created_at = booking.created_at;
        let booking = booking.into_booking();
        let lines: Vec<BookingAccessoryLine> = lines
            .into_iter()
            .map(|line| line.into_line(booking.id, created_at))
            .collect();

        state.profiles.entry(profile.id).or_insert(profile);
        state.bookings.insert(booking.id, booking.clone());
        state.lines.insert(booking.id, lines.clone());

        Ok(BookingDetails {
            booking,
            accessories: lines,
        })
    }

    async fn find_booking(&self, booking_id: &str) -> StoreResult<Option<Booking>> {
        let state = self.state.read().await;
        Ok(state
            .bookings
            .values()
            .find(|booking| booking.booking_id == booking_id)
            .cloned())
    }

    async fn find_user_booking(
        &self,
        booking_id: &str,
        user_id: Uuid,
    ) -> StoreResult<Option<Booking>> {
        let state = self.state.read().await;
        Ok(state
            .bookings
            .values()
            .find(|booking| booking.booking_id == booking_id && booking.user_id == user_id)
            .cloned())
    }

    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let state = self.state.read().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn list_bookings(&self, query: &ListBookingsQuery) -> StoreResult<Vec<Booking>> {
        let (limit, offset) = query.window();
        let state = self.state.read().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|booking| {
                query
                    .booking_status
                    .map_or(true, |status| booking.booking_status == status)
                    && query
                        .payment_status
                        .map_or(true, |status| booking.payment_status == status)
                    && query
                        .cancellation_status
                        .map_or(true, |status| booking.cancellation_status == Some(status))
            })
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn accessory_lines(&self, booking_row_id: Uuid) -> StoreResult<Vec<BookingAccessoryLine>> {
        let state = self.state.read().await;
        Ok(state.lines.get(&booking_row_id).cloned().unwrap_or_default())
    }

    async fn replace_accessories(
        &self,
        booking: &Booking,
        costs: &CostBreakdown,
        lines: Vec<NewAccessoryLine>,
        claims: &[ResourceClaim],
        now: DateTime<Utc>,
    ) -> StoreResult<Booking> {
        let mut state = self.state.write().await;
        if !state.bookings.contains_key(&booking.id) {
            return Err(StoreError::NotFound);
        }

        let previous = state.lines.remove(&booking.id).unwrap_or_default();
        if let Err(err) = state.check_claims(claims, booking.pickup_date, booking.return_date) {
            state.lines.insert(booking.id, previous);
            return Err(err);
        }

        let lines = lines
            .into_iter()
            .map(|line| line.into_line(booking.id, now))
            .collect();
        state.lines.insert(booking.id, lines);

        let stored = state.booking_mut(booking.id)?;
        let unpaid = matches!(
            stored.payment_status,
            PaymentStatus::Pending | PaymentStatus::Failed
        );
        if unpaid && stored.total_amount != costs.total() {
            stored.payment_order_id = None;
        }
        stored.apply_costs(costs);
        stored.updated_at = now;
        Ok(stored.clone())
    }

    async fn record_payment_order(&self, order: &PaymentOrder) -> StoreResult<Booking> {
        let mut state = self.state.write().await;
        let booking = state.booking_mut(order.booking_id)?;
        booking.payment_provider = Some(order.provider.clone());
        booking.payment_order_id = Some(order.order_id.clone());
        booking.updated_at = order.created_at;
        let updated = booking.clone();

        state
            .orders
            .entry(order.booking_id)
            .or_default()
            .push(order.clone());
        Ok(updated)
    }

    async fn find_payment_order(
        &self,
        booking_row_id: Uuid,
        order_id: &str,
    ) -> StoreResult<Option<PaymentOrder>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .get(&booking_row_id)
            .and_then(|orders| orders.iter().find(|order| order.order_id == order_id))
            .cloned())
    }

    async fn payment_orders(&self, booking_row_id: Uuid) -> StoreResult<Vec<PaymentOrder>> {
        let state = self.state.read().await;
        let mut orders = state.orders.get(&booking_row_id).cloned().unwrap_or_default();
        orders.reverse();
        Ok(orders)
    }

    async fn find_settled_by_transaction(
        &self,
        transaction_id: &str,
    ) -> StoreResult<Option<Booking>> {
        let state = self.state.read().await;
        Ok(state
            .bookings
            .values()
            .find(|booking| {
                booking.payment_transaction_id.as_deref() == Some(transaction_id)
                    && matches!(
                        booking.payment_status,
                        PaymentStatus::Completed | PaymentStatus::Refunded
                    )
            })
            .cloned())
    }

    async fn complete_payment(
        &self,
        booking_row_id: Uuid,
        record: &PaymentRecord,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentTransition> {
        let mut state = self.state.write().await;
        let booking = state.booking_mut(booking_row_id)?;
        if !accepts_completion(booking) {
            return Ok(PaymentTransition::unchanged(booking.clone()));
        }

        booking.payment_status = PaymentStatus::Completed;
        booking.booking_status = BookingStatus::Confirmed;
        booking.payment_provider = Some(record.provider.clone());
        if record.order_id.is_some() {
            booking.payment_order_id = record.order_id.clone();
        }
        booking.payment_transaction_id = record.transaction_id.clone();
        booking.payment_signature = record.signature.clone();
        booking.payment_method = record.method.clone();
        booking.updated_at = now;
        Ok(PaymentTransition::Applied(booking.clone()))
    }

    async fn fail_payment(
        &self,
        booking_row_id: Uuid,
        record: &PaymentRecord,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Booking>> {
        let mut state = self.state.write().await;
        let booking = state.booking_mut(booking_row_id)?;
        if booking.payment_status != PaymentStatus::Pending {
            return Ok(None);
        }

        booking.payment_status = PaymentStatus::Failed;
        booking.payment_provider = Some(record.provider.clone());
        if record.transaction_id.is_some() {
            booking.payment_transaction_id = record.transaction_id.clone();
        }
        booking.updated_at = now;
        Ok(Some(booking.clone()))
    }

    async fn request_cancellation(
        &self,
        booking_row_id: Uuid,
        reason: &str,
        quote: &CancellationQuote,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Booking>> {
        let mut state = self.state.write().await;
        let booking = state.booking_mut(booking_row_id)?;
        let open = matches!(
            booking.cancellation_status,
            Some(CancellationStatus::Requested) | Some(CancellationStatus::Approved)
        );
        if booking.booking_status == BookingStatus::Cancelled || open {
            return Ok(None);
        }

        booking.cancellation_requested_at = Some(now);
        booking.cancellation_reason = Some(reason.to_string());
        booking.cancellation_status = Some(CancellationStatus::Requested);
        booking.cancellation_fee = Some(quote.cancellation_fee);
        booking.refund_amount = Some(quote.refund_amount);
        booking.updated_at = now;
        Ok(Some(booking.clone()))
    }

    async fn resolve_cancellation(
        &self,
        booking_row_id: Uuid,
        approve: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Booking>> {
        let mut state = self.state.write().await;
        let booking = state.booking_mut(booking_row_id)?;
        if booking.cancellation_status != Some(CancellationStatus::Requested) {
            return Ok(None);
        }

        if approve {
            booking.cancellation_status = Some(CancellationStatus::Approved);
            booking.booking_status = BookingStatus::Cancelled;
            let refund_due = booking
                .refund_amount
                .map_or(false, |refund| refund > rust_decimal::Decimal::ZERO);
            if booking.payment_status == PaymentStatus::Completed && refund_due {
                booking.payment_status = PaymentStatus::Refunded;
            }
        } else {
            booking.cancellation_status = Some(CancellationStatus::Rejected);
        }
        booking.updated_at = now;
        Ok(Some(booking.clone()))
    }

    async fn update_booking(&self, booking: &Booking) -> StoreResult<Booking> {
        let mut state = self.state.write().await;
        let stored = state.booking_mut(booking.id)?;
        stored.booking_status = booking.booking_status;
        stored.payment_status = booking.payment_status;
        stored.apply_costs(&booking.costs());
        stored.updated_at = booking.updated_at;
        Ok(stored.clone())
    }

    async fn pending_payments(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Booking>> {
        let state = self.state.read().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|booking| {
                booking.payment_status == PaymentStatus::Pending
                    && booking.booking_status != BookingStatus::Cancelled
                    && booking.payment_order_id.is_some()
                    && booking.updated_at < updated_before
            })
            .cloned()
            .collect();
        bookings.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        bookings.truncate(limit.max(0) as usize);
        Ok(bookings)
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn reserve_attempt(
        &self,
        phone_number: &str,
        limit: i32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i32>> {
        let mut state = self.state.write().await;
        let window_start = now - window;

        let record = state
            .rate_limits
            .entry(phone_number.to_string())
            .or_insert_with(|| RateLimitRecord {
                phone_number: phone_number.to_string(),
                attempts: 0,
                first_attempt: now,
                last_attempt: now,
            });

        if record.attempts > 0 && record.window_expired(window_start) {
            record.attempts = 0;
            record.first_attempt = now;
        }
        if record.attempts >= limit {
            return Ok(None);
        }

        record.attempts += 1;
        record.last_attempt = now;
        Ok(Some(record.attempts))
    }
}
