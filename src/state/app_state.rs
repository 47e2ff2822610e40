//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::{OtpService, SessionVerifier};
use crate::availability::AvailabilityService;
use crate::booking::BookingService;
use crate::db::Database;
use crate::payment::PaymentService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub booking_service: Arc<BookingService>,
    pub payment_service: Arc<PaymentService>,
    pub otp_service: Arc<OtpService>,
    pub availability_service: Arc<AvailabilityService>,
    pub session_verifier: Arc<SessionVerifier>,
    /// `None` when running on the in-memory store
    pub database: Option<Database>,
}

impl AppState {
    pub fn new(
        booking_service: Arc<BookingService>,
        payment_service: Arc<PaymentService>,
        otp_service: Arc<OtpService>,
        availability_service: Arc<AvailabilityService>,
        session_verifier: Arc<SessionVerifier>,
        database: Option<Database>,
    ) -> Self {
        Self {
            booking_service,
            payment_service,
            otp_service,
            availability_service,
            session_verifier,
            database,
        }
    }
}

impl FromRef<AppState> for Arc<BookingService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.booking_service.clone()
    }
}

impl FromRef<AppState> for Arc<PaymentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.payment_service.clone()
    }
}

impl FromRef<AppState> for Arc<OtpService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.otp_service.clone()
    }
}

impl FromRef<AppState> for Arc<AvailabilityService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.availability_service.clone()
    }
}

impl FromRef<AppState> for Arc<SessionVerifier> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.session_verifier.clone()
    }
}
