//! Redirect-checkout gateway (PhonePe standard checkout v2)

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::gateway::{PaymentError, PaymentGateway};
use super::model::{
    CreatedOrder, GatewayState, OrderRequest, PaymentCorrelation, PaymentVerification,
};
use crate::config::{PaymentProvider, PhonePeConfig};

/// Checkout orders expire after 20 minutes
const ORDER_EXPIRY_SECS: u64 = 1200;

const SANDBOX_AUTH_URL: &str = "https://api-preprod.phonepe.com/apis/pg-sandbox/v1/oauth/token";
const SANDBOX_API_BASE: &str = "https://api-preprod.phonepe.com/apis/pg-sandbox";
const PRODUCTION_AUTH_URL: &str =
    "https://api.phonepe.com/apis/identity-manager/v1/oauth/token";
const PRODUCTION_API_BASE: &str = "https://api.phonepe.com/apis/pg";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
}

fn default_token_type() -> String {
    "O-Bearer".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayResponse {
    order_id: String,
    redirect_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    state: String,
    #[serde(default)]
    payment_details: Vec<PaymentDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentDetail {
    transaction_id: Option<String>,
    payment_mode: Option<String>,
    state: Option<String>,
}

/// Convert rupees to paise, the unit the gateway bills in
pub fn to_paise(amount: Decimal) -> Result<i64, PaymentError> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .filter(|paise| *paise > 0)
        .ok_or_else(|| PaymentError::InvalidInput(format!("Invalid payment amount: {}", amount)))
}

pub struct PhonePeGateway {
    config: PhonePeConfig,
    client: Client,
    auth_url: String,
    api_base: String,
}

impl PhonePeGateway {
    pub fn new(config: PhonePeConfig) -> Self {
        let (auth_url, api_base) = if config.production {
            (PRODUCTION_AUTH_URL, PRODUCTION_API_BASE)
        } else {
            (SANDBOX_AUTH_URL, SANDBOX_API_BASE)
        };

        Self {
            config,
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            auth_url: auth_url.to_string(),
            api_base: api_base.to_string(),
        }
    }

    /// Exchange client credentials for a short-lived bearer credential.
    /// A fresh credential is fetched for every call.
    async fn authorization(&self) -> Result<String, PaymentError> {
        let response = self
            .client
            .post(&self.auth_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_version", self.config.client_version.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let token: TokenResponse = read_json(response).await?;
        Ok(format!("{} {}", token.token_type, token.access_token))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PaymentError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PaymentError::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| PaymentError::Unexpected(e.to_string()))
}

#[async_trait]
impl PaymentGateway for PhonePeGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::PhonePe
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<CreatedOrder, PaymentError> {
        let amount = to_paise(order.amount)?;
        let authorization = self.authorization().await?;

        let body = json!({
            "merchantOrderId": order.merchant_order_id,
            "amount": amount,
            "expireAfter": ORDER_EXPIRY_SECS,
            "metaInfo": { "udf1": order.receipt },
            "paymentFlow": {
                "type": "PG_CHECKOUT",
                "message": format!("Payment for {}", order.receipt),
                "merchantUrls": { "redirectUrl": order.callback_url }
            }
        });

        let response = self
            .client
            .post(format!("{}/checkout/v2/pay", self.api_base))
            .header("Authorization", authorization)
            .json(&body)
            .send()
            .await?;
        let created: PayResponse = read_json(response).await?;

        tracing::info!(
            merchant_order_id = %order.merchant_order_id,
            order_id = %created.order_id,
            "Redirect checkout order created"
        );

        Ok(CreatedOrder {
            provider: PaymentProvider::PhonePe,
            order_id: created.order_id,
            correlation_id: order.merchant_order_id.clone(),
            redirect_url: Some(created.redirect_url),
            checkout_key: None,
        })
    }

    async fn verify_payment(
        &self,
        correlation: &PaymentCorrelation,
    ) -> Result<PaymentVerification, PaymentError> {
        if correlation.order_id.is_empty() {
            return Err(PaymentError::InvalidInput(
                "merchantOrderId is required".to_string(),
            ));
        }
        let authorization = self.authorization().await?;

        let response = self
            .client
            .get(format!(
                "{}/checkout/v2/order/{}/status",
                self.api_base, correlation.order_id
            ))
            .header("Authorization", authorization)
            .send()
            .await?;
        let status: StatusResponse = read_json(response).await?;

        Ok(verification_from_status(status))
    }
}

fn verification_from_status(status: StatusResponse) -> PaymentVerification {
    let state = GatewayState::from_provider(&status.state);

    // Prefer the attempt that matches the order state, else the latest one
    let detail = status
        .payment_details
        .iter()
        .rev()
        .find(|detail| detail.state.as_deref() == Some(status.state.as_str()))
        .or_else(|| status.payment_details.last());

    PaymentVerification {
        state,
        transaction_id: detail.and_then(|d| d.transaction_id.clone()),
        method: detail.and_then(|d| d.payment_mode.clone()),
        signature: None,
    }
}
