//! Signature-verified gateway (Razorpay orders + checkout signature)

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;

use super::gateway::{PaymentError, PaymentGateway};
use super::model::{
    CreatedOrder, GatewayState, OrderRequest, PaymentCorrelation, PaymentVerification,
};
use super::phonepe::to_paise;
use crate::config::{PaymentProvider, RazorpayConfig};

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.razorpay.com/v1";

/// Hex-encoded HMAC-SHA256 of `"{order_id}|{payment_id}"` under `secret`
pub fn payment_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
) -> Result<String, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Unexpected(format!("signing key rejected: {}", e)))?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Exact comparison of a client signature against the expected hex digest
pub fn signature_matches(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    match payment_signature(secret, order_id, payment_id) {
        Ok(expected) => expected.as_bytes().ct_eq(signature.as_bytes()).into(),
        Err(_) => false,
    }
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OrderPayments {
    #[serde(default)]
    items: Vec<OrderPayment>,
}

#[derive(Debug, Deserialize)]
struct OrderPayment {
    id: String,
    status: String,
    method: Option<String>,
}

pub struct RazorpayGateway {
    config: RazorpayConfig,
    client: Client,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            config,
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Poll the order's payments; used when no checkout signature is at hand
    async fn poll_order(&self, order_id: &str) -> Result<PaymentVerification, PaymentError> {
        let response = self
            .client
            .get(format!("{}/orders/{}/payments", API_BASE, order_id))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let payments: OrderPayments = response
            .json()
            .await
            .map_err(|e| PaymentError::Unexpected(e.to_string()))?;

        Ok(verification_from_payments(payments))
    }
}

fn verification_from_payments(payments: OrderPayments) -> PaymentVerification {
    // A failed attempt can be retried on the same order, so only a capture is final
    match payments
        .items
        .into_iter()
        .find(|payment| payment.status == "captured")
    {
        Some(payment) => PaymentVerification {
            state: GatewayState::Completed,
            transaction_id: Some(payment.id),
            method: payment.method,
            signature: None,
        },
        None => PaymentVerification::pending(),
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Razorpay
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<CreatedOrder, PaymentError> {
        let body = json!({
            "amount": to_paise(order.amount)?,
            "currency": order.currency,
            "receipt": order.receipt,
            "notes": { "merchant_order_id": order.merchant_order_id }
        });

        let response = self
            .client
            .post(format!("{}/orders", API_BASE))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let created: OrderResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Unexpected(e.to_string()))?;

        tracing::info!(
            merchant_order_id = %order.merchant_order_id,
            order_id = %created.id,
            "Signed checkout order created"
        );

        Ok(CreatedOrder {
            provider: PaymentProvider::Razorpay,
            order_id: created.id.clone(),
            correlation_id: created.id,
            redirect_url: None,
            checkout_key: Some(self.config.key_id.clone()),
        })
    }

    async fn verify_payment(
        &self,
        correlation: &PaymentCorrelation,
    ) -> Result<PaymentVerification, PaymentError> {
        match (&correlation.payment_id, &correlation.signature) {
            (Some(payment_id), Some(signature)) => {
                if !signature_matches(
                    &self.config.key_secret,
                    &correlation.order_id,
                    payment_id,
                    signature,
                ) {
                    tracing::warn!(order_id = %correlation.order_id, "Payment signature mismatch");
                    return Err(PaymentError::InvalidSignature);
                }
                Ok(PaymentVerification {
                    state: GatewayState::Completed,
                    transaction_id: Some(payment_id.clone()),
                    method: None,
                    signature: Some(signature.clone()),
                })
            }
            (None, None) => self.poll_order(&correlation.order_id).await,
            _ => Err(PaymentError::InvalidInput(
                "Payment id and signature must be sent together".to_string(),
            )),
        }
    }
}
