//! Payment order creation, verification and reconciliation

mod common;

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    use cyclerent_server::booking::{
        Booking, BookingStatus, ModifyAccessoriesRequest, PaymentStatus,
    };
    use cyclerent_server::config::PaymentProvider;
    use cyclerent_server::error::ApiError;
    use cyclerent_server::models::ResourceKind;
    use cyclerent_server::payment::{
        payment_signature, CreateOrderRequest, CreateOrderResponse, GatewayState,
        SignatureVerifyRequest, SignatureVerifyResponse, VerifyPaymentRequest,
    };
    use cyclerent_server::store::{BookingStore, CapacitySource};

    use crate::common::{ts, Harness, ADMIN_NUMBER, RAZORPAY_SECRET};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn order_request(booking: &Booking, amount: Decimal, is_addon: bool) -> CreateOrderRequest {
        CreateOrderRequest {
            amount,
            currency: "INR".to_string(),
            receipt: None,
            booking_id: booking.booking_id.clone(),
            is_addon,
        }
    }

    fn verify_request(booking: &Booking, order: &CreateOrderResponse) -> VerifyPaymentRequest {
        VerifyPaymentRequest {
            merchant_order_id: order.merchant_order_id.clone(),
            booking_id: booking.booking_id.clone(),
            is_addon: false,
        }
    }

    /// Pickup of the harness booking, 2025-06-14 09:00 IST
    fn pickup_at() -> DateTime<Utc> {
        ts("2025-06-14T03:30:00Z")
    }

    fn signed(booking: &Booking, order_id: &str, payment_id: &str) -> SignatureVerifyRequest {
        SignatureVerifyRequest {
            razorpay_order_id: order_id.to_string(),
            razorpay_payment_id: payment_id.to_string(),
            razorpay_signature: payment_signature(RAZORPAY_SECRET, order_id, payment_id).unwrap(),
            booking_id: booking.booking_id.clone(),
        }
    }

    async fn pay_signed(
        h: &Harness,
        request: SignatureVerifyRequest,
    ) -> Result<SignatureVerifyResponse, ApiError> {
        h.payments
            .verify_signature(None, request, ts("2025-06-10T04:40:00Z"))
            .await
    }

    async fn reload(h: &Harness, booking: &Booking) -> Booking {
        h.store
            .find_booking(&booking.booking_id)
            .await
            .unwrap()
            .unwrap()
    }

    /// A booking with a recorded order, as returned by `create_order`
    async fn ordered(h: &Harness) -> (Booking, CreateOrderResponse) {
        let user_id = Uuid::new_v4();
        let booking = h.booked(user_id).await.booking;
        let order = h
            .payments
            .create_order(
                user_id,
                order_request(&booking, booking.total_amount, false),
                ts("2025-06-10T04:35:00Z"),
            )
            .await
            .unwrap();
        (booking, order)
    }

    #[tokio::test]
    async fn test_create_order_records_gateway_order() {
        let h = Harness::new().await;
        let (booking, order) = ordered(&h).await;

        assert!(order.success);
        assert!(order
            .merchant_order_id
            .starts_with(&format!("{}_", booking.booking_id)));
        assert_eq!(order.order_id, "OMO1");
        assert!(order.redirect_url.is_some());

        let sent = h.gateway.orders.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].amount, dec("1308.80"));
        assert_eq!(sent[0].receipt, booking.booking_id);
        assert_eq!(
            sent[0].callback_url,
            format!(
                "https://rent.example.com/payment-status?merchantOrderId={}",
                order.merchant_order_id
            )
        );

        let stored = reload(&h, &booking).await;
        assert_eq!(stored.payment_provider.as_deref(), Some("phonepe"));
        assert_eq!(
            stored.payment_order_id.as_deref(),
            Some(order.merchant_order_id.as_str())
        );
        assert_eq!(stored.payment_status, PaymentStatus::Pending);

        let history = h.store.payment_orders(booking.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].order_id, order.merchant_order_id);
        assert_eq!(history[0].amount, dec("1308.80"));
        assert_eq!(history[0].provider, "phonepe");
    }

    #[tokio::test]
    async fn test_create_order_amount_must_match_total() {
        let h = Harness::new().await;
        let user_id = Uuid::new_v4();
        let booking = h.booked(user_id).await.booking;
        let now = ts("2025-06-10T04:35:00Z");

        let err = h
            .payments
            .create_order(user_id, order_request(&booking, dec("1000"), false), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let err = h
            .payments
            .create_order(user_id, order_request(&booking, Decimal::ZERO, true), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let err = h
            .payments
            .create_order(
                Uuid::new_v4(),
                order_request(&booking, booking.total_amount, false),
                now,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        assert!(h.gateway.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_verification_changes_nothing() {
        let h = Harness::new().await;
        let (booking, order) = ordered(&h).await;

        let response = h
            .payments
            .verify_redirect(None, verify_request(&booking, &order), ts("2025-06-10T04:40:00Z"))
            .await
            .unwrap();

        assert!(response.success);
        assert!(!response.verified);
        assert_eq!(response.state, GatewayState::Pending);
        assert_eq!(reload(&h, &booking).await.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_completed_verification_is_idempotent() {
        let h = Harness::new().await;
        let (booking, order) = ordered(&h).await;
        h.gateway.set_state(GatewayState::Completed);
        let now = ts("2025-06-10T04:40:00Z");

        let first = h
            .payments
            .verify_redirect(None, verify_request(&booking, &order), now)
            .await
            .unwrap();
        assert!(first.verified);
        assert_eq!(first.transaction_id.as_deref(), Some("TXN-1"));

        let second = h
            .payments
            .verify_redirect(None, verify_request(&booking, &order), now + Duration::minutes(1))
            .await
            .unwrap();
        assert!(second.verified);

        let stored = reload(&h, &booking).await;
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
        assert_eq!(stored.payment_transaction_id.as_deref(), Some("TXN-1"));
        assert_eq!(stored.payment_method.as_deref(), Some("UPI"));

        // One customer confirmation and one admin alert, despite two calls
        assert_eq!(h.messenger.wait_for(3).await, 2);
        let mut recipients = h.messenger.recipients();
        recipients.sort();
        assert_eq!(
            recipients,
            vec![ADMIN_NUMBER.to_string(), "+919876543210".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_payment_does_not_downgrade_completed() {
        let h = Harness::new().await;
        let (booking, order) = ordered(&h).await;
        let now = ts("2025-06-10T04:40:00Z");

        h.gateway.set_state(GatewayState::Failed);
        let response = h
            .payments
            .verify_redirect(None, verify_request(&booking, &order), now)
            .await
            .unwrap();
        assert!(!response.verified);
        assert_eq!(reload(&h, &booking).await.payment_status, PaymentStatus::Failed);

        let h = Harness::new().await;
        let (booking, order) = ordered(&h).await;
        h.gateway.set_state(GatewayState::Completed);
        h.payments
            .verify_redirect(None, verify_request(&booking, &order), now)
            .await
            .unwrap();

        h.gateway.set_state(GatewayState::Failed);
        h.payments
            .verify_redirect(None, verify_request(&booking, &order), now)
            .await
            .unwrap();
        assert_eq!(
            reload(&h, &booking).await.payment_status,
            PaymentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_verify_rejects_foreign_order() {
        let h = Harness::new().await;
        let (booking, _order) = ordered(&h).await;

        let err = h
            .payments
            .verify_redirect(
                None,
                VerifyPaymentRequest {
                    merchant_order_id: format!("{}_DEADBEEF", booking.booking_id),
                    booking_id: booking.booking_id.clone(),
                    is_addon: false,
                },
                ts("2025-06-10T04:40:00Z"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::InvalidInput(_)));
        assert_eq!(h.gateway.verify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_signature_verification() {
        let h = Harness::with_primary(PaymentProvider::Razorpay).await;
        let (booking, order) = ordered(&h).await;
        assert_eq!(order.merchant_order_id, "order_RZP1");
        assert_eq!(order.checkout_key.as_deref(), Some("rzp_test_key"));

        let mut tampered = signed(&booking, "order_RZP1", "pay_1");
        tampered.razorpay_signature = "00".repeat(32);
        let err = pay_signed(&h, tampered).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidSignature));
        assert_eq!(reload(&h, &booking).await.payment_status, PaymentStatus::Pending);

        let request = signed(&booking, "order_RZP1", "pay_1");
        let signature = request.razorpay_signature.clone();
        let response = pay_signed(&h, request).await.unwrap();

        assert!(response.success);
        assert_eq!(response.booking.payment_status, PaymentStatus::Completed);
        assert_eq!(response.booking.payment_provider.as_deref(), Some("razorpay"));
        assert_eq!(response.booking.payment_order_id.as_deref(), Some("order_RZP1"));
        assert_eq!(
            response.booking.payment_transaction_id.as_deref(),
            Some("pay_1")
        );
        assert_eq!(response.booking.payment_signature, Some(signature));
    }

    #[tokio::test]
    async fn test_signature_needs_order_recorded_for_booking() {
        let h = Harness::with_primary(PaymentProvider::Razorpay).await;
        let user_id = Uuid::new_v4();
        let booking = h.booked(user_id).await.booking;

        // Validly signed, but no order was ever raised for this booking
        let err = pay_signed(&h, signed(&booking, "order_ELSEWHERE", "pay_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        // An add-on order is for a price difference, not the booking total
        let addon = h
            .payments
            .create_order(
                user_id,
                order_request(&booking, dec("1"), true),
                ts("2025-06-10T04:35:00Z"),
            )
            .await
            .unwrap();
        let err = pay_signed(&h, signed(&booking, &addon.merchant_order_id, "pay_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let stored = reload(&h, &booking).await;
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert!(stored.payment_transaction_id.is_none());

        // A redirect-checkout order cannot be settled by a checkout signature
        let h = Harness::new().await;
        let (booking, order) = ordered(&h).await;
        let err = pay_signed(&h, signed(&booking, &order.merchant_order_id, "pay_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        assert_eq!(reload(&h, &booking).await.payment_status, PaymentStatus::Pending);
        assert_eq!(h.messenger.wait_for(1).await, 0);
    }

    #[tokio::test]
    async fn test_transaction_settles_only_one_booking() {
        let h = Harness::with_primary(PaymentProvider::Razorpay).await;
        let (first, first_order) = ordered(&h).await;

        let second_cycle = Uuid::new_v4();
        h.store.add_cycle(second_cycle, 1).await;
        let owner = Uuid::new_v4();
        let mut request = h.booking_request(h.helmets(1));
        request.cycle_id = second_cycle;
        let second = h
            .bookings
            .create_booking(owner, request, ts("2025-06-10T04:30:00Z"))
            .await
            .unwrap()
            .booking;
        let second_order = h
            .payments
            .create_order(
                owner,
                order_request(&second, second.total_amount, false),
                ts("2025-06-10T04:36:00Z"),
            )
            .await
            .unwrap();

        pay_signed(&h, signed(&first, &first_order.merchant_order_id, "pay_1"))
            .await
            .unwrap();

        let err = pay_signed(&h, signed(&second, &second_order.merchant_order_id, "pay_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let stored = reload(&h, &second).await;
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert!(stored.payment_transaction_id.is_none());
        assert_eq!(reload(&h, &first).await.payment_status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_refunded_booking_stays_closed() {
        let h = Harness::with_primary(PaymentProvider::Razorpay).await;
        let (booking, _order) = ordered(&h).await;

        pay_signed(&h, signed(&booking, "order_RZP1", "pay_1"))
            .await
            .unwrap();
        assert_eq!(h.messenger.wait_for(2).await, 2);

        let now = pickup_at() - Duration::hours(30);
        h.bookings
            .request_cancellation(booking.user_id, &booking.booking_id, "Plans changed", now)
            .await
            .unwrap();
        let approved = h
            .bookings
            .resolve_cancellation(&booking.booking_id, true, now)
            .await
            .unwrap();
        assert_eq!(approved.payment_status, PaymentStatus::Refunded);

        // The same checkout result arrives again
        let response = pay_signed(&h, signed(&booking, "order_RZP1", "pay_1"))
            .await
            .unwrap();
        assert_eq!(response.booking.booking_status, BookingStatus::Cancelled);
        assert_eq!(response.booking.payment_status, PaymentStatus::Refunded);
        assert_eq!(reload(&h, &booking).await, approved);
        assert_eq!(h.messenger.wait_for(3).await, 2);
    }

    #[tokio::test]
    async fn test_payment_after_cancellation_does_not_confirm() {
        let h = Harness::new().await;
        let (booking, order) = ordered(&h).await;
        let now = pickup_at() - Duration::hours(30);

        h.bookings
            .request_cancellation(booking.user_id, &booking.booking_id, "Plans changed", now)
            .await
            .unwrap();
        h.bookings
            .resolve_cancellation(&booking.booking_id, true, now)
            .await
            .unwrap();

        h.gateway.set_state(GatewayState::Completed);
        let response = h
            .payments
            .verify_redirect(None, verify_request(&booking, &order), now)
            .await
            .unwrap();
        assert!(response.verified);

        let stored = reload(&h, &booking).await;
        assert_eq!(stored.booking_status, BookingStatus::Cancelled);
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert_eq!(h.messenger.wait_for(1).await, 0);
    }

    #[tokio::test]
    async fn test_failed_payment_keeps_capacity_until_retried() {
        let h = Harness::new().await;
        let (booking, order) = ordered(&h).await;
        let now = ts("2025-06-10T04:40:00Z");

        h.gateway.set_state(GatewayState::Failed);
        h.payments
            .verify_redirect(None, verify_request(&booking, &order), now)
            .await
            .unwrap();
        assert_eq!(reload(&h, &booking).await.payment_status, PaymentStatus::Failed);

        // The single unit is still held for the failed booking
        let err = h
            .bookings
            .create_booking(Uuid::new_v4(), h.booking_request(vec![]), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ResourceUnavailable(_)));

        h.gateway.set_state(GatewayState::Completed);
        h.payments
            .verify_redirect(None, verify_request(&booking, &order), now)
            .await
            .unwrap();

        let stored = reload(&h, &booking).await;
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
        assert_eq!(stored.booking_status, BookingStatus::Confirmed);

        let remaining = h
            .store
            .available_units(
                ResourceKind::Cycle,
                h.cycle_id,
                booking.pickup_date,
                booking.return_date,
            )
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_earlier_order_still_settles_booking() {
        let h = Harness::new().await;
        let (booking, first) = ordered(&h).await;
        let second = h
            .payments
            .create_order(
                booking.user_id,
                order_request(&booking, booking.total_amount, false),
                ts("2025-06-10T04:37:00Z"),
            )
            .await
            .unwrap();
        assert_ne!(first.merchant_order_id, second.merchant_order_id);
        assert_eq!(
            reload(&h, &booking).await.payment_order_id.as_deref(),
            Some(second.merchant_order_id.as_str())
        );

        // The customer paid on the first checkout page
        h.gateway.set_state(GatewayState::Completed);
        let response = h
            .payments
            .verify_redirect(None, verify_request(&booking, &first), ts("2025-06-10T04:40:00Z"))
            .await
            .unwrap();
        assert!(response.verified);

        let stored = reload(&h, &booking).await;
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
        assert_eq!(
            stored.payment_order_id.as_deref(),
            Some(first.merchant_order_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_revision_retires_unpaid_order() {
        let h = Harness::new().await;
        let (booking, stale) = ordered(&h).await;

        h.bookings
            .revise_accessories(
                booking.user_id,
                ModifyAccessoriesRequest {
                    booking_id: booking.booking_id.clone(),
                    accessories: h.helmets(2),
                    price_difference: None,
                },
                pickup_at() - Duration::minutes(121),
            )
            .await
            .unwrap();
        let revised = reload(&h, &booking).await;
        assert_eq!(revised.total_amount, dec("1379.60"));
        assert!(revised.payment_order_id.is_none());

        h.gateway.set_state(GatewayState::Completed);
        let now = ts("2025-06-11T00:00:00Z");
        let err = h
            .payments
            .verify_redirect(None, verify_request(&booking, &stale), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        assert_eq!(reload(&h, &booking).await.payment_status, PaymentStatus::Pending);

        let fresh = h
            .payments
            .create_order(
                booking.user_id,
                order_request(&booking, dec("1379.60"), false),
                now,
            )
            .await
            .unwrap();
        h.payments
            .verify_redirect(None, verify_request(&booking, &fresh), now)
            .await
            .unwrap();
        assert_eq!(
            reload(&h, &booking).await.payment_status,
            PaymentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_session_scopes_verification_to_owner() {
        let h = Harness::new().await;
        let (booking, order) = ordered(&h).await;
        let now = ts("2025-06-10T04:40:00Z");

        let err = h
            .payments
            .verify_redirect(Some(Uuid::new_v4()), verify_request(&booking, &order), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(h.gateway.verify_calls.load(Ordering::SeqCst), 0);

        let response = h
            .payments
            .verify_redirect(Some(booking.user_id), verify_request(&booking, &order), now)
            .await
            .unwrap();
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_addon_order_leaves_booking_untouched() {
        let h = Harness::new().await;
        let user_id = Uuid::new_v4();
        let booking = h.booked(user_id).await.booking;
        let now = ts("2025-06-11T00:00:00Z");

        let order = h
            .payments
            .create_order(user_id, order_request(&booking, dec("70.80"), true), now)
            .await
            .unwrap();
        assert!(order
            .merchant_order_id
            .starts_with(&format!("{}_ADD_", booking.booking_id)));
        assert_eq!(reload(&h, &booking).await, booking);

        h.gateway.set_state(GatewayState::Completed);
        let response = h
            .payments
            .verify_redirect(
                None,
                VerifyPaymentRequest {
                    merchant_order_id: order.merchant_order_id.clone(),
                    booking_id: booking.booking_id.clone(),
                    is_addon: true,
                },
                now,
            )
            .await
            .unwrap();

        assert!(response.verified);
        assert_eq!(reload(&h, &booking).await, booking);

        let err = h
            .payments
            .verify_redirect(
                None,
                VerifyPaymentRequest {
                    merchant_order_id: "BK000000OTHER_ADD_1234ABCD".to_string(),
                    booking_id: booking.booking_id.clone(),
                    is_addon: true,
                },
                now,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_sweep_settles_idle_orders() {
        let h = Harness::new().await;
        let (booking, _order) = ordered(&h).await;
        let ordered_at = ts("2025-06-10T04:35:00Z");

        // Too recent to be swept
        h.gateway.set_state(GatewayState::Completed);
        let settled = h
            .payments
            .sweep_pending(ordered_at - Duration::minutes(1), ordered_at)
            .await
            .unwrap();
        assert_eq!(settled, 0);
        assert_eq!(h.gateway.verify_calls.load(Ordering::SeqCst), 0);

        h.store
            .touch_booking(booking.id, ordered_at - Duration::minutes(10))
            .await;
        let settled = h
            .payments
            .sweep_pending(ordered_at - Duration::minutes(5), ordered_at)
            .await
            .unwrap();
        assert_eq!(settled, 1);
        assert_eq!(
            reload(&h, &booking).await.payment_status,
            PaymentStatus::Completed
        );

        // Completed bookings drop out of the sweep
        let settled = h
            .payments
            .sweep_pending(ordered_at + Duration::hours(1), ordered_at + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(settled, 0);
        assert_eq!(h.gateway.verify_calls.load(Ordering::SeqCst), 1);
    }
}
