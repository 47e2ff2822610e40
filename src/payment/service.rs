//! Payment orchestration - order creation, verification and reconciliation

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::gateway::GatewayRegistry;
use super::model::{
    CreateOrderRequest, CreateOrderResponse, GatewayState, OrderRequest, PaymentCorrelation,
    PaymentOrder, PaymentRecord, PaymentVerification, SignatureVerifyRequest,
    SignatureVerifyResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::booking::{Booking, BookingStatus, PaymentStatus};
use crate::config::PaymentProvider;
use crate::error::{ApiError, ApiResult};
use crate::notification::{NotificationDispatcher, NotificationKind};
use crate::store::{BookingStore, PaymentTransition};

/// Bookings checked per sweep pass
const SWEEP_BATCH: i64 = 50;

/// Payment service for gateway orders and booking reconciliation
pub struct PaymentService {
    store: Arc<dyn BookingStore>,
    gateways: GatewayRegistry,
    notifier: NotificationDispatcher,
    public_site_url: String,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateways: GatewayRegistry,
        notifier: NotificationDispatcher,
        public_site_url: String,
    ) -> Self {
        Self {
            store,
            gateways,
            notifier,
            public_site_url: public_site_url.trim_end_matches('/').to_string(),
        }
    }

    /// Booking named by a verification request. With a session, the booking
    /// must belong to its user.
    async fn load_booking(&self, booking_id: &str, caller: Option<Uuid>) -> ApiResult<Booking> {
        match self.store.find_booking(booking_id).await? {
            Some(booking) if caller.map_or(true, |user_id| booking.user_id == user_id) => Ok(booking),
            _ => Err(ApiError::NotFound("Booking not found".to_string())),
        }
    }

    /// A full-amount order recorded for `booking`, optionally from one provider
    async fn recorded_order(
        &self,
        booking: &Booking,
        order_id: &str,
        provider: Option<PaymentProvider>,
    ) -> ApiResult<PaymentOrder> {
        self.store
            .find_payment_order(booking.id, order_id)
            .await?
            .filter(|order| provider.map_or(true, |provider| order.is_from(provider)))
            .ok_or_else(|| {
                ApiError::InvalidInput("Order does not belong to this booking".to_string())
            })
    }

    /// Create a gateway order paying for a booking, or for the price
    /// difference of a modification when `is_addon` is set
    pub async fn create_order(
        &self,
        user_id: Uuid,
        request: CreateOrderRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<CreateOrderResponse> {
        request.validate()?;
        if request.amount <= Decimal::ZERO {
            return Err(ApiError::InvalidInput(
                "Amount must be greater than zero".to_string(),
            ));
        }

        let booking = self
            .store
            .find_user_booking(&request.booking_id, user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Booking not found".to_string()))?;

        if booking.booking_status == BookingStatus::Cancelled {
            return Err(ApiError::InvalidInput(
                "Cancelled bookings cannot be paid".to_string(),
            ));
        }
        if !request.is_addon {
            if booking.is_paid() {
                return Err(ApiError::InvalidInput(
                    "Booking is already paid".to_string(),
                ));
            }
            if request.amount != booking.total_amount {
                return Err(ApiError::InvalidInput(format!(
                    "Amount does not match booking total of {}",
                    booking.total_amount
                )));
            }
        }

        let merchant_order_id = merchant_order_id(&booking.booking_id, request.is_addon);
        let order = OrderRequest {
            amount: request.amount,
            currency: request.currency.to_ascii_uppercase(),
            receipt: request
                .receipt
                .unwrap_or_else(|| booking.booking_id.clone()),
            callback_url: format!(
                "{}/payment-status?merchantOrderId={}",
                self.public_site_url, merchant_order_id
            ),
            merchant_order_id,
        };

        let gateway = self.gateways.primary()?;
        let created = gateway.create_order(&order).await?;

        // Earlier orders stay in the history and can still settle the booking
        if !request.is_addon {
            self.store
                .record_payment_order(&PaymentOrder::new(booking.id, &created, request.amount, now))
                .await?;
        }

        tracing::info!(
            booking_id = %booking.booking_id,
            provider = created.provider.as_str(),
            order_id = %created.order_id,
            is_addon = request.is_addon,
            "Payment order created"
        );

        Ok(CreateOrderResponse {
            success: true,
            merchant_order_id: created.correlation_id,
            redirect_url: created.redirect_url,
            order_id: created.order_id,
            checkout_key: created.checkout_key,
        })
    }

    /// Verify a redirect-checkout payment by polling its gateway
    pub async fn verify_redirect(
        &self,
        caller: Option<Uuid>,
        request: VerifyPaymentRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<VerifyPaymentResponse> {
        request.validate()?;
        let booking = self.load_booking(&request.booking_id, caller).await?;

        if request.is_addon {
            if !request.merchant_order_id.starts_with(&booking.booking_id) {
                return Err(ApiError::InvalidInput(
                    "Order does not belong to this booking".to_string(),
                ));
            }
            let gateway = self.gateways.primary()?;
            let verification = gateway
                .verify_payment(&PaymentCorrelation::order(&request.merchant_order_id))
                .await?;

            tracing::info!(
                booking_id = %booking.booking_id,
                order_id = %request.merchant_order_id,
                state = verification.state.as_str(),
                "Add-on payment checked"
            );
            return Ok(verify_response(&verification));
        }

        let order = self
            .recorded_order(&booking, &request.merchant_order_id, None)
            .await?;
        let gateway = self.gateways.for_recorded(Some(order.provider.as_str()))?;
        let verification = gateway
            .verify_payment(&PaymentCorrelation::order(&order.order_id))
            .await?;

        self.reconcile(&booking, gateway.provider(), &order, &verification, now)
            .await?;

        Ok(verify_response(&verification))
    }

    /// Verify a signed checkout payment against an order raised for this
    /// booking. A bad signature leaves the booking untouched.
    pub async fn verify_signature(
        &self,
        caller: Option<Uuid>,
        request: SignatureVerifyRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<SignatureVerifyResponse> {
        request.validate()?;
        let booking = self.load_booking(&request.booking_id, caller).await?;
        let order = self
            .recorded_order(
                &booking,
                &request.razorpay_order_id,
                Some(PaymentProvider::Razorpay),
            )
            .await?;

        let gateway = self.gateways.get(PaymentProvider::Razorpay)?;
        let correlation = PaymentCorrelation {
            order_id: order.order_id.clone(),
            payment_id: Some(request.razorpay_payment_id.clone()),
            signature: Some(request.razorpay_signature.clone()),
        };
        let verification = gateway.verify_payment(&correlation).await?;

        let booking = self
            .reconcile(&booking, gateway.provider(), &order, &verification, now)
            .await?;

        Ok(SignatureVerifyResponse {
            success: verification.is_verified(),
            booking,
        })
    }

    /// Apply a gateway verdict on one of the booking's orders.
    ///
    /// Completion is written once; repeating it is a no-op and sends nothing.
    /// Cancelled and refunded bookings are never reopened. Notifications are
    /// queued only after the write has committed.
    pub async fn reconcile(
        &self,
        booking: &Booking,
        provider: PaymentProvider,
        order: &PaymentOrder,
        verification: &PaymentVerification,
        now: DateTime<Utc>,
    ) -> ApiResult<Booking> {
        let record = PaymentRecord::from_verification(provider, &order.order_id, verification);

        match verification.state {
            GatewayState::Completed => {
                self.check_settlement(booking, order, &record).await?;

                match self.store.complete_payment(booking.id, &record, now).await? {
                    PaymentTransition::Applied(updated) => {
                        tracing::info!(
                            booking_id = %updated.booking_id,
                            provider = provider.as_str(),
                            transaction_id = ?record.transaction_id,
                            "Payment completed"
                        );
                        self.notifier
                            .notify(NotificationKind::CustomerConfirmation, &updated.booking_id);
                        self.notifier
                            .notify(NotificationKind::AdminNewBooking, &updated.booking_id);
                        Ok(updated)
                    }
                    PaymentTransition::AlreadyCompleted(current) => {
                        tracing::debug!(
                            booking_id = %current.booking_id,
                            "Payment already completed"
                        );
                        Ok(current)
                    }
                    PaymentTransition::Closed(current) => {
                        tracing::warn!(
                            booking_id = %current.booking_id,
                            booking_status = ?current.booking_status,
                            payment_status = ?current.payment_status,
                            transaction_id = ?record.transaction_id,
                            "Payment reported for a closed booking, left unchanged"
                        );
                        Ok(current)
                    }
                }
            }
            GatewayState::Failed => {
                match self.store.fail_payment(booking.id, &record, now).await? {
                    Some(updated) => {
                        tracing::warn!(
                            booking_id = %updated.booking_id,
                            provider = provider.as_str(),
                            "Payment failed"
                        );
                        Ok(updated)
                    }
                    None => Ok(self.load_booking(&booking.booking_id, None).await?),
                }
            }
            GatewayState::Pending => {
                tracing::debug!(
                    booking_id = %booking.booking_id,
                    provider = provider.as_str(),
                    "Payment still pending"
                );
                Ok(booking.clone())
            }
        }
    }

    /// A captured payment settles one booking, for the amount its order was
    /// raised for
    async fn check_settlement(
        &self,
        booking: &Booking,
        order: &PaymentOrder,
        record: &PaymentRecord,
    ) -> ApiResult<()> {
        if let Some(transaction_id) = record.transaction_id.as_deref() {
            if let Some(other) = self.store.find_settled_by_transaction(transaction_id).await? {
                if other.id != booking.id {
                    tracing::warn!(
                        booking_id = %booking.booking_id,
                        settled_booking_id = %other.booking_id,
                        transaction_id,
                        "Payment already settles another booking"
                    );
                    return Err(ApiError::InvalidInput(
                        "Payment is already attached to another booking".to_string(),
                    ));
                }
            }
        }

        let unpaid = matches!(
            booking.payment_status,
            PaymentStatus::Pending | PaymentStatus::Failed
        );
        if unpaid && order.amount != booking.total_amount {
            tracing::warn!(
                booking_id = %booking.booking_id,
                order_id = %order.order_id,
                order_amount = %order.amount,
                total = %booking.total_amount,
                transaction_id = ?record.transaction_id,
                "Paid order no longer matches the booking total"
            );
            return Err(ApiError::InvalidInput(format!(
                "Order amount {} does not match booking total of {}",
                order.amount, booking.total_amount
            )));
        }

        Ok(())
    }

    /// Re-verify unpaid bookings whose order has been idle since `idle_since`.
    /// Returns how many bookings reached a terminal payment state.
    pub async fn sweep_pending(&self, idle_since: DateTime<Utc>, now: DateTime<Utc>) -> ApiResult<usize> {
        let bookings = self.store.pending_payments(idle_since, SWEEP_BATCH).await?;
        let mut settled = 0;

        for booking in bookings {
            match self.recheck(&booking, now).await {
                Ok(updated) if updated.payment_status != booking.payment_status => settled += 1,
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    booking_id = %booking.booking_id,
                    error = %e,
                    "Pending payment check failed"
                ),
            }
        }

        Ok(settled)
    }

    /// Poll every order still matching the booking total, newest first. A
    /// captured order wins; otherwise the newest order's verdict applies.
    async fn recheck(&self, booking: &Booking, now: DateTime<Utc>) -> ApiResult<Booking> {
        let orders = self.store.payment_orders(booking.id).await?;
        let mut newest = None;

        for order in orders
            .into_iter()
            .filter(|order| order.amount == booking.total_amount)
        {
            let gateway = self.gateways.for_recorded(Some(order.provider.as_str()))?;
            let verification = gateway
                .verify_payment(&PaymentCorrelation::order(&order.order_id))
                .await?;

            if verification.is_verified() {
                return self
                    .reconcile(booking, gateway.provider(), &order, &verification, now)
                    .await;
            }
            if newest.is_none() {
                newest = Some((gateway.provider(), order, verification));
            }
        }

        match newest {
            Some((provider, order, verification)) => {
                self.reconcile(booking, provider, &order, &verification, now)
                    .await
            }
            None => Ok(booking.clone()),
        }
    }
}

/// `{booking_id}_{8 hex}`, with `_ADD_` before the suffix for add-on orders
fn merchant_order_id(booking_id: &str, is_addon: bool) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_ascii_uppercase();
    if is_addon {
        format!("{}_ADD_{}", booking_id, suffix)
    } else {
        format!("{}_{}", booking_id, suffix)
    }
}

fn verify_response(verification: &PaymentVerification) -> VerifyPaymentResponse {
    VerifyPaymentResponse {
        success: true,
        verified: verification.is_verified(),
        state: verification.state,
        transaction_id: verification.transaction_id.clone(),
    }
}

/// Background job re-checking payments the customer never came back to verify
pub async fn payment_sweeper(payment_service: Arc<PaymentService>, interval: std::time::Duration) {
    tracing::info!(interval_secs = interval.as_secs(), "Starting payment sweeper");

    let idle = Duration::from_std(interval).unwrap_or_else(|_| Duration::minutes(2));
    loop {
        tokio::time::sleep(interval).await;

        let now = Utc::now();
        match payment_service.sweep_pending(now - idle, now).await {
            Ok(0) => {}
            Ok(settled) => tracing::info!(settled, "Pending payments reconciled"),
            Err(e) => tracing::error!("Error sweeping pending payments: {}", e),
        }
    }
}
