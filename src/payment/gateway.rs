//! Payment gateway capability and the registry that selects gateways by provider

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::model::{CreatedOrder, OrderRequest, PaymentCorrelation, PaymentVerification};
use crate::config::PaymentProvider;

/// Gateway errors
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Payment provider '{0}' is not configured")]
    NotConfigured(String),

    #[error("Payment gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Payment gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected payment gateway response: {0}")]
    Unexpected(String),
}

/// One payment provider's order and verification API.
///
/// Each implementation owns its authentication handshake. Callers never
/// branch on which provider they hold.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// Create an order for the customer to pay
    async fn create_order(&self, order: &OrderRequest) -> Result<CreatedOrder, PaymentError>;

    /// Independently establish whether the payment went through
    async fn verify_payment(
        &self,
        correlation: &PaymentCorrelation,
    ) -> Result<PaymentVerification, PaymentError>;
}

/// Configured gateways, keyed by provider, with one primary for new orders
#[derive(Clone)]
pub struct GatewayRegistry {
    primary: PaymentProvider,
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new(primary: PaymentProvider) -> Self {
        Self {
            primary,
            gateways: HashMap::new(),
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    /// Gateway used for new orders
    pub fn primary(&self) -> Result<Arc<dyn PaymentGateway>, PaymentError> {
        self.get(self.primary)
    }

    pub fn get(&self, provider: PaymentProvider) -> Result<Arc<dyn PaymentGateway>, PaymentError> {
        self.gateways
            .get(&provider)
            .cloned()
            .ok_or_else(|| PaymentError::NotConfigured(provider.as_str().to_string()))
    }

    /// Gateway that created a booking's order, falling back to the primary
    /// when the booking has none recorded
    pub fn for_recorded(
        &self,
        recorded: Option<&str>,
    ) -> Result<Arc<dyn PaymentGateway>, PaymentError> {
        match recorded {
            Some(name) => {
                let provider = PaymentProvider::parse(name)
                    .map_err(|_| PaymentError::NotConfigured(name.to_string()))?;
                self.get(provider)
            }
            None => self.primary(),
        }
    }
}
