//! Payment models and request/response DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::booking::Booking;
use crate::config::PaymentProvider;

/// Order handed to a gateway
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Amount in rupees
    pub amount: Decimal,
    pub currency: String,
    pub receipt: String,
    /// Our correlation id, echoed back by redirect-style gateways
    pub merchant_order_id: String,
    /// Where the customer lands after a redirect checkout
    pub callback_url: String,
}

/// Order created by a gateway
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedOrder {
    pub provider: PaymentProvider,
    /// Gateway-assigned order id
    pub order_id: String,
    /// Id the gateway's `verify_payment` expects
    pub correlation_id: String,
    /// Checkout page for redirect-style gateways
    pub redirect_url: Option<String>,
    /// Public key the client checkout widget needs, for signature-style gateways
    pub checkout_key: Option<String>,
}

/// A full-amount gateway order raised for a booking.
///
/// Kept for every order, so a payment on an older order still settles the
/// booking after a newer one was created.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PaymentOrder {
    /// Correlation id the order is verified by
    pub order_id: String,
    /// Row id of the booking
    pub booking_id: Uuid,
    pub provider: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl PaymentOrder {
    pub fn new(
        booking_row_id: Uuid,
        created: &CreatedOrder,
        amount: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: created.correlation_id.clone(),
            booking_id: booking_row_id,
            provider: created.provider.as_str().to_string(),
            amount,
            created_at,
        }
    }

    pub fn is_from(&self, provider: PaymentProvider) -> bool {
        self.provider == provider.as_str()
    }
}

/// Input for checking whether a payment went through.
///
/// Redirect-style gateways only need `order_id` (the merchant order id).
/// Signature-style gateways also take the payment id and signature the client
/// received from checkout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentCorrelation {
    pub order_id: String,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
}

impl PaymentCorrelation {
    pub fn order(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            ..Default::default()
        }
    }
}

/// Payment state as reported by a gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayState {
    Completed,
    Failed,
    Pending,
}

impl GatewayState {
    /// Map a gateway state string; anything unknown is still pending
    pub fn from_provider(state: &str) -> Self {
        match state.to_ascii_uppercase().as_str() {
            "COMPLETED" => GatewayState::Completed,
            "FAILED" => GatewayState::Failed,
            _ => GatewayState::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayState::Completed => "COMPLETED",
            GatewayState::Failed => "FAILED",
            GatewayState::Pending => "PENDING",
        }
    }
}

/// Result of a gateway verification
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentVerification {
    pub state: GatewayState,
    pub transaction_id: Option<String>,
    pub method: Option<String>,
    pub signature: Option<String>,
}

impl PaymentVerification {
    pub fn pending() -> Self {
        Self {
            state: GatewayState::Pending,
            transaction_id: None,
            method: None,
            signature: None,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.state == GatewayState::Completed
    }
}

/// Payment correlation fields written onto a booking
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentRecord {
    pub provider: String,
    pub order_id: Option<String>,
    pub transaction_id: Option<String>,
    pub signature: Option<String>,
    pub method: Option<String>,
}

impl PaymentRecord {
    pub fn from_verification(
        provider: PaymentProvider,
        order_id: &str,
        verification: &PaymentVerification,
    ) -> Self {
        Self {
            provider: provider.as_str().to_string(),
            order_id: Some(order_id.to_string()),
            transaction_id: verification.transaction_id.clone(),
            signature: verification.signature.clone(),
            method: verification.method.clone(),
        }
    }
}

fn default_currency() -> String {
    "INR".to_string()
}

/// Request DTO for creating a payment order
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub amount: Decimal,
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,
    #[validate(length(max = 40))]
    pub receipt: Option<String>,
    #[validate(length(min = 1))]
    pub booking_id: String,
    /// Payment for a price difference after a modification
    #[serde(default)]
    pub is_addon: bool,
}

/// Response DTO for a created payment order
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub success: bool,
    pub merchant_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_key: Option<String>,
}

/// Request DTO for verifying a redirect-checkout payment
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[serde(rename = "merchantOrderId")]
    #[validate(length(min = 1))]
    pub merchant_order_id: String,
    #[validate(length(min = 1))]
    pub booking_id: String,
    #[serde(default)]
    pub is_addon: bool,
}

/// Response DTO for a redirect-checkout verification
#[derive(Debug, Serialize, PartialEq)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub verified: bool,
    pub state: GatewayState,
    #[serde(rename = "transactionId", skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Request DTO for verifying a signed checkout payment
#[derive(Debug, Deserialize, Validate)]
pub struct SignatureVerifyRequest {
    #[validate(length(min = 1))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1))]
    pub razorpay_signature: String,
    #[validate(length(min = 1))]
    pub booking_id: String,
}

/// Response DTO for a signed checkout verification
#[derive(Debug, Serialize)]
pub struct SignatureVerifyResponse {
    pub success: bool,
    pub booking: Booking,
}
