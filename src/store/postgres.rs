//! Postgres-backed store

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    ordered_claims, BookingStore, CapacitySource, PaymentTransition, RateLimitStore, StoreError,
    StoreResult,
};
use crate::booking::{
    Booking, BookingAccessoryLine, BookingDetails, CancellationQuote, CostBreakdown,
    ListBookingsQuery, NewAccessoryLine, NewBooking,
};
use crate::models::{Profile, ResourceClaim, ResourceKind};
use crate::payment::{PaymentOrder, PaymentRecord};

/// Store implementation over a `PgPool`
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn capacity_query(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Cycle => "SELECT get_cycle_available_units($1, $2, $3)",
        ResourceKind::Accessory => "SELECT get_accessory_available_units($1, $2, $3)",
    }
}

async fn available_units_on(
    conn: &mut PgConnection,
    kind: ResourceKind,
    resource_id: Uuid,
    pickup_date: NaiveDate,
    return_date: NaiveDate,
) -> StoreResult<i32> {
    let units: Option<i32> = sqlx::query_scalar(capacity_query(kind))
        .bind(resource_id)
        .bind(pickup_date)
        .bind(return_date)
        .fetch_one(conn)
        .await?;

    Ok(units.unwrap_or(0))
}

/// Lock each claimed resource for the rest of the transaction and make sure
/// enough units remain. Runs inside the caller's transaction.
async fn reserve_claims(
    conn: &mut PgConnection,
    claims: &[ResourceClaim],
    pickup_date: NaiveDate,
    return_date: NaiveDate,
) -> StoreResult<()> {
    for claim in ordered_claims(claims) {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(claim.lock_key())
            .execute(&mut *conn)
            .await?;

        let available = available_units_on(
            &mut *conn,
            claim.kind,
            claim.resource_id,
            pickup_date,
            return_date,
        )
        .await?;

        if available < claim.quantity {
            tracing::info!(
                resource = %claim.lock_key(),
                available,
                requested = claim.quantity,
                "Claim rejected, not enough capacity"
            );
            return Err(StoreError::Unavailable(claim));
        }
    }
    Ok(())
}

async fn insert_lines(
    conn: &mut PgConnection,
    booking_row_id: Uuid,
    lines: Vec<NewAccessoryLine>,
    created_at: DateTime<Utc>,
) -> StoreResult<Vec<BookingAccessoryLine>> {
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let lines: Vec<BookingAccessoryLine> = lines
        .into_iter()
        .map(|line| line.into_line(booking_row_id, created_at))
        .collect();

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO booking_accessories \
         (id, booking_id, accessory_id, quantity, days, price_per_day, total_cost, created_at) ",
    );
    builder.push_values(&lines, |mut row, line| {
        row.push_bind(line.id)
            .push_bind(line.booking_id)
            .push_bind(line.accessory_id)
            .push_bind(line.quantity)
            .push_bind(line.days)
            .push_bind(line.price_per_day)
            .push_bind(line.total_cost)
            .push_bind(line.created_at);
    });
    builder.push(" RETURNING *");

    let inserted = builder
        .build_query_as::<BookingAccessoryLine>()
        .fetch_all(conn)
        .await?;

    Ok(inserted)
}

#[async_trait]
impl CapacitySource for PgStore {
    async fn available_units(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        pickup_date: NaiveDate,
        return_date: NaiveDate,
    ) -> StoreResult<i32> {
        let mut conn = self.pool.acquire().await?;
        available_units_on(&mut *conn, kind, resource_id, pickup_date, return_date).await
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn find_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(profile)
    }

    async fn create_booking(
        &self,
        booking: NewBooking,
        profile: Profile,
        lines: Vec<NewAccessoryLine>,
        claims: &[ResourceClaim],
    ) -> StoreResult<BookingDetails> {
        let mut tx = self.pool.begin().await?;

        reserve_claims(&mut *tx, claims, booking.pickup_date, booking.return_date).await?;

        sqlx::query(
            r#"
            INSERT INTO profiles (id, full_name, phone_number, email, emergency_contact,
                                  id_document_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(profile.id)
        .bind(&profile.full_name)
        .bind(&profile.phone_number)
        .bind(&profile.email)
        .bind(&profile.emergency_contact)
        .bind(&profile.id_document_url)
        .bind(profile.created_at)
        .execute(&mut *tx)
        .await?;

        let created_at = booking.created_at;
        let row = booking.into_booking();
        let inserted = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (
                id, booking_id, user_id, cycle_id, partner_id,
                pickup_date, pickup_time, return_date, return_time,
                cycle_rental_cost, accessories_cost, insurance_cost, gst,
                security_deposit, discount_amount, total_amount,
                booking_status, payment_status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20)
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(&row.booking_id)
        .bind(row.user_id)
        .bind(row.cycle_id)
        .bind(row.partner_id)
        .bind(row.pickup_date)
        .bind(row.pickup_time)
        .bind(row.return_date)
        .bind(row.return_time)
        .bind(row.cycle_rental_cost)
        .bind(row.accessories_cost)
        .bind(row.insurance_cost)
        .bind(row.gst)
        .bind(row.security_deposit)
        .bind(row.discount_amount)
        .bind(row.total_amount)
        .bind(row.booking_status)
        .bind(row.payment_status)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        let accessories = insert_lines(&mut *tx, inserted.id, lines, created_at).await?;

        tx.commit().await?;

        Ok(BookingDetails {
            booking: inserted,
            accessories,
        })
    }

    async fn find_booking(&self, booking_id: &str) -> StoreResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE booking_id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(booking)
    }

    async fn find_user_booking(
        &self,
        booking_id: &str,
        user_id: Uuid,
    ) -> StoreResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE booking_id = $1 AND user_id = $2",
        )
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    async fn list_bookings(&self, query: &ListBookingsQuery) -> StoreResult<Vec<Booking>> {
        let (limit, offset) = query.window();
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM bookings WHERE 1=1");

        if let Some(status) = query.booking_status {
            builder.push(" AND booking_status = ").push_bind(status);
        }
        if let Some(status) = query.payment_status {
            builder.push(" AND payment_status = ").push_bind(status);
        }
        if let Some(status) = query.cancellation_status {
            builder.push(" AND cancellation_status = ").push_bind(status);
        }

        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let bookings = builder
            .build_query_as::<Booking>()
            .fetch_all(&self.pool)
            .await?;

        Ok(bookings)
    }

    async fn accessory_lines(&self, booking_row_id: Uuid) -> StoreResult<Vec<BookingAccessoryLine>> {
        let lines = sqlx::query_as::<_, BookingAccessoryLine>(
            "SELECT * FROM booking_accessories WHERE booking_id = $1 ORDER BY created_at, id",
        )
        .bind(booking_row_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    async fn replace_accessories(
        &self,
        booking: &Booking,
        costs: &CostBreakdown,
        lines: Vec<NewAccessoryLine>,
        claims: &[ResourceClaim],
        now: DateTime<Utc>,
    ) -> StoreResult<Booking> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM booking_accessories WHERE booking_id = $1")
            .bind(booking.id)
            .execute(&mut *tx)
            .await?;

        reserve_claims(&mut *tx, claims, booking.pickup_date, booking.return_date).await?;

        insert_lines(&mut *tx, booking.id, lines, now).await?;

        let updated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET accessories_cost = $2,
                gst = $3,
                total_amount = $4,
                payment_order_id = CASE
                    WHEN payment_status IN ('pending', 'failed') AND total_amount <> $4 THEN NULL
                    ELSE payment_order_id
                END,
                updated_at = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(costs.accessories_cost)
        .bind(costs.gst)
        .bind(costs.total())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        tx.commit().await?;

        Ok(updated)
    }

    async fn record_payment_order(&self, order: &PaymentOrder) -> StoreResult<Booking> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO payment_orders (order_id, booking_id, provider, amount, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&order.order_id)
        .bind(order.booking_id)
        .bind(&order.provider)
        .bind(order.amount)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET payment_provider = $2, payment_order_id = $3, updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(order.booking_id)
        .bind(&order.provider)
        .bind(&order.order_id)
        .bind(order.created_at)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        tx.commit().await?;

        Ok(booking)
    }

    async fn find_payment_order(
        &self,
        booking_row_id: Uuid,
        order_id: &str,
    ) -> StoreResult<Option<PaymentOrder>> {
        let order = sqlx::query_as::<_, PaymentOrder>(
            "SELECT * FROM payment_orders WHERE booking_id = $1 AND order_id = $2",
        )
        .bind(booking_row_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn payment_orders(&self, booking_row_id: Uuid) -> StoreResult<Vec<PaymentOrder>> {
        let orders = sqlx::query_as::<_, PaymentOrder>(
            "SELECT * FROM payment_orders WHERE booking_id = $1 ORDER BY created_at DESC",
        )
        .bind(booking_row_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn find_settled_by_transaction(
        &self,
        transaction_id: &str,
    ) -> StoreResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE payment_transaction_id = $1
              AND payment_status IN ('completed', 'refunded')
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    async fn complete_payment(
        &self,
        booking_row_id: Uuid,
        record: &PaymentRecord,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentTransition> {
        let applied = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET payment_status = 'completed',
                booking_status = 'confirmed',
                payment_provider = $2,
                payment_order_id = COALESCE($3, payment_order_id),
                payment_transaction_id = $4,
                payment_signature = $5,
                payment_method = $6,
                updated_at = $7
            WHERE id = $1
              AND payment_status IN ('pending', 'failed')
              AND booking_status <> 'cancelled'
            RETURNING *
            "#,
        )
        .bind(booking_row_id)
        .bind(&record.provider)
        .bind(&record.order_id)
        .bind(&record.transaction_id)
        .bind(&record.signature)
        .bind(&record.method)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(booking) = applied {
            return Ok(PaymentTransition::Applied(booking));
        }

        let current = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(booking_row_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(PaymentTransition::unchanged(current))
    }

    async fn fail_payment(
        &self,
        booking_row_id: Uuid,
        record: &PaymentRecord,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET payment_status = 'failed',
                payment_provider = $2,
                payment_transaction_id = COALESCE($3, payment_transaction_id),
                updated_at = $4
            WHERE id = $1 AND payment_status = 'pending'
            RETURNING *
            "#,
        )
        .bind(booking_row_id)
        .bind(&record.provider)
        .bind(&record.transaction_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    async fn request_cancellation(
        &self,
        booking_row_id: Uuid,
        reason: &str,
        quote: &CancellationQuote,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET cancellation_requested_at = $2,
                cancellation_reason = $3,
                cancellation_status = 'requested',
                cancellation_fee = $4,
                refund_amount = $5,
                updated_at = $2
            WHERE id = $1
              AND booking_status <> 'cancelled'
              AND (cancellation_status IS NULL OR cancellation_status = 'rejected')
            RETURNING *
            "#,
        )
        .bind(booking_row_id)
        .bind(now)
        .bind(reason)
        .bind(quote.cancellation_fee)
        .bind(quote.refund_amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    async fn resolve_cancellation(
        &self,
        booking_row_id: Uuid,
        approve: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Booking>> {
        let sql = if approve {
            r#"
            UPDATE bookings
            SET cancellation_status = 'approved',
                booking_status = 'cancelled',
                payment_status = CASE
                    WHEN payment_status = 'completed' AND COALESCE(refund_amount, 0) > 0
                        THEN 'refunded'::payment_status
                    ELSE payment_status
                END,
                updated_at = $2
            WHERE id = $1 AND cancellation_status = 'requested'
            RETURNING *
            "#
        } else {
            r#"
            UPDATE bookings
            SET cancellation_status = 'rejected', updated_at = $2
            WHERE id = $1 AND cancellation_status = 'requested'
            RETURNING *
            "#
        };

        let booking = sqlx::query_as::<_, Booking>(sql)
            .bind(booking_row_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        Ok(booking)
    }

    async fn update_booking(&self, booking: &Booking) -> StoreResult<Booking> {
        let costs = booking.costs();
        sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET booking_status = $2,
                payment_status = $3,
                cycle_rental_cost = $4,
                accessories_cost = $5,
                insurance_cost = $6,
                gst = $7,
                security_deposit = $8,
                discount_amount = $9,
                total_amount = $10,
                updated_at = $11
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(booking.booking_status)
        .bind(booking.payment_status)
        .bind(costs.cycle_rental_cost)
        .bind(costs.accessories_cost)
        .bind(costs.insurance_cost)
        .bind(costs.gst)
        .bind(costs.security_deposit)
        .bind(costs.discount_amount)
        .bind(costs.total())
        .bind(booking.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn pending_payments(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE payment_status = 'pending'
              AND booking_status <> 'cancelled'
              AND payment_order_id IS NOT NULL
              AND updated_at < $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(updated_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }
}

#[async_trait]
impl RateLimitStore for PgStore {
    async fn reserve_attempt(
        &self,
        phone_number: &str,
        limit: i32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i32>> {
        // The WHERE clause on the conflict branch turns a limited phone into
        // "no row returned" instead of a write.
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            INSERT INTO otp_rate_limits (phone_number, attempts, first_attempt, last_attempt)
            VALUES ($1, 1, $2, $2)
            ON CONFLICT (phone_number) DO UPDATE
            SET attempts = CASE
                    WHEN otp_rate_limits.first_attempt <= $3 THEN 1
                    ELSE otp_rate_limits.attempts + 1
                END,
                first_attempt = CASE
                    WHEN otp_rate_limits.first_attempt <= $3 THEN $2
                    ELSE otp_rate_limits.first_attempt
                END,
                last_attempt = $2
            WHERE otp_rate_limits.first_attempt <= $3
               OR otp_rate_limits.attempts < $4
            RETURNING attempts
            "#,
        )
        .bind(phone_number)
        .bind(now)
        .bind(now - window)
        .bind(limit)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempts)
    }
}
