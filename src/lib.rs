//! CycleRent Backend Library
//!
//! Booking lifecycle and payment reconciliation for a bicycle-rental service.

pub mod auth;
pub mod availability;
pub mod booking;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod notification;
pub mod payment;
pub mod routes;
pub mod state;
pub mod store;

use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use config::Config;
use payment::{GatewayRegistry, PhonePeGateway, RazorpayGateway};
use state::AppState;

/// Assemble the API router with tracing and CORS layers
pub fn build_router(app_state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health_check))
        .merge(routes::auth_routes())
        .merge(routes::booking_routes())
        .merge(routes::payment_routes())
        .merge(routes::admin_routes())
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(cors)
}

/// CORS from a comma-separated origin list; permissive when unset
pub fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allowed_origins_str = allowed_origins.unwrap_or_default().trim();

    if allowed_origins_str.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins_str
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

/// Every configured payment gateway, with the configured primary
pub fn gateway_registry(config: &Config) -> GatewayRegistry {
    let mut registry = GatewayRegistry::new(config.payment_provider);
    if let Some(phonepe) = &config.phonepe {
        registry = registry.with_gateway(Arc::new(PhonePeGateway::new(phonepe.clone())));
    }
    if let Some(razorpay) = &config.razorpay {
        registry = registry.with_gateway(Arc::new(RazorpayGateway::new(razorpay.clone())));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaymentProvider;

    #[test]
    fn test_gateway_registry_from_config() {
        let config = config::test_config();
        let registry = gateway_registry(&config);
        assert_eq!(registry.primary().unwrap().provider(), PaymentProvider::PhonePe);
        assert!(registry.get(PaymentProvider::Razorpay).is_err());
    }
}
