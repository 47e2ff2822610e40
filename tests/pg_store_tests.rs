//! Postgres store tests
//!
//! Need a scratch database: set TEST_DATABASE_URL and run with `--ignored`.

mod common;

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use sqlx::PgPool;
    use std::sync::Arc;
    use uuid::Uuid;

    use cyclerent_server::availability::AvailabilityService;
    use cyclerent_server::booking::{BookingService, BusinessClock, PaymentStatus};
    use cyclerent_server::db;
    use cyclerent_server::error::ApiError;
    use cyclerent_server::notification::{NotificationDispatcher, NotificationWorker};
    use cyclerent_server::payment::{PaymentOrder, PaymentRecord};
    use cyclerent_server::store::{BookingStore, PaymentTransition, PgStore, RateLimitStore};

    use crate::common::{ts, Harness, RecordingMessenger};

    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/cyclerent_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");
        db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    /// Insert a cycle and an accessory, returning their ids
    async fn seed_catalog(pool: &PgPool) -> (Uuid, Uuid) {
        let cycle_id = Uuid::new_v4();
        let accessory_id = Uuid::new_v4();
        sqlx::query("INSERT INTO cycles (id, name, quantity) VALUES ($1, 'Test cycle', 1)")
            .bind(cycle_id)
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO accessories (id, name, quantity) VALUES ($1, 'Helmet', 3)")
            .bind(accessory_id)
            .execute(pool)
            .await
            .unwrap();
        (cycle_id, accessory_id)
    }

    fn booking_service(store: Arc<PgStore>) -> BookingService {
        let worker = NotificationWorker::new(
            store.clone(),
            Arc::new(RecordingMessenger::default()),
            vec![],
        );
        let (notifier, _task) = NotificationDispatcher::spawn(8, worker);
        BookingService::new(
            store.clone(),
            Arc::new(AvailabilityService::new(store)),
            BusinessClock::ist(),
            notifier,
        )
    }

    #[tokio::test]
    #[ignore]
    async fn test_booking_claims_capacity_atomically() {
        let pool = setup_test_db().await;
        let (cycle_id, accessory_id) = seed_catalog(&pool).await;
        let store = Arc::new(PgStore::new(pool.clone()));
        let service = booking_service(store.clone());

        // Reuse the in-memory fixture's request shape against the seeded ids
        let h = Harness::new().await;
        let mut request = h.booking_request(h.helmets(1));
        request.cycle_id = cycle_id;
        request.accessories[0].accessory_id = accessory_id;
        let now = ts("2025-06-10T04:30:00Z");

        let details = service
            .create_booking(Uuid::new_v4(), request.clone(), now)
            .await
            .unwrap();
        assert!(details.booking.total_is_consistent());

        let stored = store
            .find_booking(&details.booking.booking_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.total_amount, details.booking.total_amount);
        assert_eq!(store.accessory_lines(stored.id).await.unwrap().len(), 1);

        let err = service
            .create_booking(Uuid::new_v4(), request, now)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ResourceUnavailable(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn test_payment_completion_is_written_once() {
        let pool = setup_test_db().await;
        let (cycle_id, _) = seed_catalog(&pool).await;
        let store = Arc::new(PgStore::new(pool.clone()));
        let service = booking_service(store.clone());

        let h = Harness::new().await;
        let mut request = h.booking_request(vec![]);
        request.cycle_id = cycle_id;
        let now = ts("2025-06-10T04:30:00Z");
        let booking = service
            .create_booking(Uuid::new_v4(), request, now)
            .await
            .unwrap()
            .booking;

        let record = PaymentRecord {
            provider: "phonepe".to_string(),
            order_id: Some(format!("{}_0000AAAA", booking.booking_id)),
            transaction_id: Some(format!("TXN-{}", Uuid::new_v4().simple())),
            ..Default::default()
        };

        let first = store.complete_payment(booking.id, &record, now).await.unwrap();
        assert!(matches!(first, PaymentTransition::Applied(_)));
        assert_eq!(first.booking().payment_status, PaymentStatus::Completed);

        let second = store.complete_payment(booking.id, &record, now).await.unwrap();
        assert!(matches!(second, PaymentTransition::AlreadyCompleted(_)));

        let failed = store.fail_payment(booking.id, &record, now).await.unwrap();
        assert!(failed.is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_order_history_and_closed_bookings() {
        let pool = setup_test_db().await;
        let (cycle_id, _) = seed_catalog(&pool).await;
        let store = Arc::new(PgStore::new(pool.clone()));
        let service = booking_service(store.clone());

        let h = Harness::new().await;
        let mut request = h.booking_request(vec![]);
        request.cycle_id = cycle_id;
        let now = ts("2025-06-10T04:30:00Z");
        let booking = service
            .create_booking(Uuid::new_v4(), request, now)
            .await
            .unwrap()
            .booking;

        let order = |suffix: &str, minutes: i64| PaymentOrder {
            order_id: format!("{}_{}", booking.booking_id, suffix),
            booking_id: booking.id,
            provider: "phonepe".to_string(),
            amount: booking.total_amount,
            created_at: now + Duration::minutes(minutes),
        };
        store.record_payment_order(&order("0000AAAA", 1)).await.unwrap();
        let latest = store.record_payment_order(&order("0000BBBB", 2)).await.unwrap();
        assert_eq!(
            latest.payment_order_id,
            Some(format!("{}_0000BBBB", booking.booking_id))
        );

        let history = store.payment_orders(booking.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].order_id.ends_with("BBBB"));
        assert_eq!(history[1].amount, booking.total_amount);
        assert!(store
            .find_payment_order(booking.id, &format!("{}_0000AAAA", booking.booking_id))
            .await
            .unwrap()
            .is_some());

        sqlx::query("UPDATE bookings SET booking_status = 'cancelled' WHERE id = $1")
            .bind(booking.id)
            .execute(&pool)
            .await
            .unwrap();

        let record = PaymentRecord {
            provider: "phonepe".to_string(),
            order_id: Some(format!("{}_0000AAAA", booking.booking_id)),
            transaction_id: Some(format!("TXN-{}", Uuid::new_v4().simple())),
            ..Default::default()
        };
        let outcome = store.complete_payment(booking.id, &record, now).await.unwrap();
        assert!(matches!(outcome, PaymentTransition::Closed(_)));
        assert_eq!(outcome.booking().payment_status, PaymentStatus::Pending);
        assert!(store
            .find_settled_by_transaction(record.transaction_id.as_deref().unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_otp_rate_limit_window() {
        let pool = setup_test_db().await;
        let store = PgStore::new(pool);
        let phone = format!("9{:09}", rand_suffix());
        let start = ts("2025-06-10T04:30:00Z");
        let window = Duration::minutes(60);

        for expected in 1..=3 {
            let attempts = store
                .reserve_attempt(&phone, 3, window, start + Duration::minutes(expected))
                .await
                .unwrap();
            assert_eq!(attempts, Some(expected as i32));
        }
        assert_eq!(
            store
                .reserve_attempt(&phone, 3, window, start + Duration::minutes(10))
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            store
                .reserve_attempt(&phone, 3, window, start + Duration::minutes(62))
                .await
                .unwrap(),
            Some(1)
        );
    }

    fn rand_suffix() -> u32 {
        (Uuid::new_v4().as_u128() % 1_000_000_000) as u32
    }
}
