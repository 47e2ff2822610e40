//! Shared fixtures for integration tests: fake providers and a wired-up
//! service graph over `MemoryStore`

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use cyclerent_server::auth::{
    IdentityProvider, IdentityUser, OtpService, Session, SessionVerifier, VerificationProvider,
};
use cyclerent_server::availability::AvailabilityService;
use cyclerent_server::booking::{
    AccessorySelection, BookingDetails, BookingService, BusinessClock, CreateBookingRequest,
};
use cyclerent_server::config::{PaymentProvider, RazorpayConfig};
use cyclerent_server::error::ProviderError;
use cyclerent_server::models::NewProfile;
use cyclerent_server::notification::{MessagingProvider, NotificationDispatcher, NotificationWorker};
use cyclerent_server::payment::{
    CreatedOrder, GatewayRegistry, GatewayState, OrderRequest, PaymentCorrelation, PaymentError,
    PaymentGateway, PaymentService, PaymentVerification, RazorpayGateway,
};
use cyclerent_server::state::AppState;
use cyclerent_server::store::MemoryStore;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const RAZORPAY_SECRET: &str = "rzp_test_secret";
pub const APPROVED_CODE: &str = "123456";
pub const ADMIN_NUMBER: &str = "+919800000001";

pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

/// Redirect-style gateway whose reported state is set by the test
pub struct FakeGateway {
    provider: PaymentProvider,
    state: Mutex<GatewayState>,
    pub orders: Mutex<Vec<OrderRequest>>,
    pub verify_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new(provider: PaymentProvider) -> Self {
        Self {
            provider,
            state: Mutex::new(GatewayState::Pending),
            orders: Mutex::new(Vec::new()),
            verify_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_state(&self, state: GatewayState) {
        *self.state.lock().unwrap() = state;
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<CreatedOrder, PaymentError> {
        let mut orders = self.orders.lock().unwrap();
        orders.push(order.clone());
        Ok(CreatedOrder {
            provider: self.provider,
            order_id: format!("OMO{}", orders.len()),
            correlation_id: order.merchant_order_id.clone(),
            redirect_url: Some(format!("https://pay.example.com/{}", order.merchant_order_id)),
            checkout_key: None,
        })
    }

    async fn verify_payment(
        &self,
        _correlation: &PaymentCorrelation,
    ) -> Result<PaymentVerification, PaymentError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let state = *self.state.lock().unwrap();
        Ok(PaymentVerification {
            state,
            transaction_id: (state == GatewayState::Completed).then(|| "TXN-1".to_string()),
            method: Some("UPI".to_string()),
            signature: None,
        })
    }
}

/// Signature-style gateway: orders are numbered locally, checkout signatures
/// go through the real HMAC check
pub struct FakeSignedGateway {
    inner: RazorpayGateway,
    pub orders: Mutex<Vec<OrderRequest>>,
}

impl FakeSignedGateway {
    pub fn new() -> Self {
        Self {
            inner: RazorpayGateway::new(RazorpayConfig {
                key_id: "rzp_test_key".to_string(),
                key_secret: RAZORPAY_SECRET.to_string(),
            }),
            orders: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeSignedGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Razorpay
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<CreatedOrder, PaymentError> {
        let mut orders = self.orders.lock().unwrap();
        orders.push(order.clone());
        let order_id = format!("order_RZP{}", orders.len());
        Ok(CreatedOrder {
            provider: PaymentProvider::Razorpay,
            order_id: order_id.clone(),
            correlation_id: order_id,
            redirect_url: None,
            checkout_key: Some("rzp_test_key".to_string()),
        })
    }

    async fn verify_payment(
        &self,
        correlation: &PaymentCorrelation,
    ) -> Result<PaymentVerification, PaymentError> {
        // Order polling would go over the network
        if correlation.payment_id.is_none() && correlation.signature.is_none() {
            return Ok(PaymentVerification::pending());
        }
        self.inner.verify_payment(correlation).await
    }
}

/// Records outgoing messages; can be told to fail every send
#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl RecordingMessenger {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(to, _)| to.clone())
            .collect()
    }

    /// Wait until at least `n` messages went out, up to two seconds
    pub async fn wait_for(&self, n: usize) -> usize {
        for _ in 0..200 {
            if self.count() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.count()
    }
}

#[async_trait]
impl MessagingProvider for RecordingMessenger {
    async fn send(&self, to: &str, body: &str) -> Result<(), ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

/// Approves exactly `APPROVED_CODE`
#[derive(Default)]
pub struct FakeVerifier {
    pub sends: Mutex<Vec<String>>,
    pub fail_send: AtomicBool,
}

#[async_trait]
impl VerificationProvider for FakeVerifier {
    async fn send_code(&self, to: &str) -> Result<(), ProviderError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ProviderError::Unexpected("verify service down".to_string()));
        }
        self.sends.lock().unwrap().push(to.to_string());
        Ok(())
    }

    async fn check_code(&self, _to: &str, code: &str) -> Result<bool, ProviderError> {
        Ok(code == APPROVED_CODE)
    }
}

/// Identity service keeping accounts and passwords in memory
#[derive(Default)]
pub struct FakeIdentity {
    pub users: Mutex<HashMap<String, (IdentityUser, String)>>,
    pub created: AtomicUsize,
    pub rotated: AtomicUsize,
}

impl FakeIdentity {
    pub fn password_of(&self, email: &str) -> Option<String> {
        self.users
            .lock()
            .unwrap()
            .get(email)
            .map(|(_, password)| password.clone())
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<IdentityUser>, ProviderError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .get(email)
            .map(|(user, _)| user.clone()))
    }

    async fn create_user(
        &self,
        email: &str,
        password: &str,
        phone: &str,
    ) -> Result<IdentityUser, ProviderError> {
        let user = IdentityUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            phone: None,
            user_metadata: serde_json::json!({ "phone": phone }),
        };
        self.created.fetch_add(1, Ordering::SeqCst);
        self.users
            .lock()
            .unwrap()
            .insert(email.to_string(), (user.clone(), password.to_string()));
        Ok(user)
    }

    async fn set_password(&self, user_id: Uuid, password: &str) -> Result<(), ProviderError> {
        let mut users = self.users.lock().unwrap();
        let entry = users
            .values_mut()
            .find(|(user, _)| user.id == user_id)
            .ok_or_else(|| ProviderError::Unexpected("no such user".to_string()))?;
        entry.1 = password.to_string();
        self.rotated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        let users = self.users.lock().unwrap();
        match users.get(email) {
            Some((user, stored)) if stored == password => Ok(Session {
                access_token: format!("access-{}", user.id),
                token_type: "bearer".to_string(),
                expires_in: 3600,
                refresh_token: "refresh".to_string(),
                user: user.clone(),
            }),
            _ => Err(ProviderError::Status {
                status: 400,
                body: "invalid_grant".to_string(),
            }),
        }
    }
}

/// Every service wired over one `MemoryStore` and the fakes above
pub struct Harness {
    pub store: MemoryStore,
    pub gateway: Arc<FakeGateway>,
    pub signed: Arc<FakeSignedGateway>,
    pub messenger: Arc<RecordingMessenger>,
    pub verifier: Arc<FakeVerifier>,
    pub identity: Arc<FakeIdentity>,
    pub availability: Arc<AvailabilityService>,
    pub bookings: Arc<BookingService>,
    pub payments: Arc<PaymentService>,
    pub otp: Arc<OtpService>,
    pub cycle_id: Uuid,
    pub accessory_id: Uuid,
}

impl Harness {
    /// One cycle unit and three units of one accessory, with new orders
    /// going to the redirect gateway
    pub async fn new() -> Self {
        Self::with_primary(PaymentProvider::PhonePe).await
    }

    pub async fn with_primary(primary: PaymentProvider) -> Self {
        let store = MemoryStore::new();
        let cycle_id = Uuid::new_v4();
        let accessory_id = Uuid::new_v4();
        store.add_cycle(cycle_id, 1).await;
        store.add_accessory(accessory_id, 3).await;

        let messenger = Arc::new(RecordingMessenger::default());
        let worker = NotificationWorker::new(
            Arc::new(store.clone()),
            messenger.clone(),
            vec![ADMIN_NUMBER.to_string()],
        );
        let (notifier, _task) = NotificationDispatcher::spawn(32, worker);

        let gateway = Arc::new(FakeGateway::new(PaymentProvider::PhonePe));
        let signed = Arc::new(FakeSignedGateway::new());
        let registry = GatewayRegistry::new(primary)
            .with_gateway(gateway.clone())
            .with_gateway(signed.clone());

        let availability = Arc::new(AvailabilityService::new(Arc::new(store.clone())));
        let bookings = Arc::new(BookingService::new(
            Arc::new(store.clone()),
            availability.clone(),
            BusinessClock::ist(),
            notifier.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            Arc::new(store.clone()),
            registry,
            notifier,
            "https://rent.example.com".to_string(),
        ));

        let verifier = Arc::new(FakeVerifier::default());
        let identity = Arc::new(FakeIdentity::default());
        let otp = Arc::new(OtpService::new(
            Arc::new(store.clone()),
            verifier.clone(),
            identity.clone(),
            "phone.example.com".to_string(),
        ));

        Self {
            store,
            gateway,
            signed,
            messenger,
            verifier,
            identity,
            availability,
            bookings,
            payments,
            otp,
            cycle_id,
            accessory_id,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.bookings.clone(),
            self.payments.clone(),
            self.otp.clone(),
            self.availability.clone(),
            Arc::new(SessionVerifier::new(JWT_SECRET)),
            None,
        )
    }

    /// Booking request for this harness's cycle, picking up 2025-06-14 09:00
    /// IST and returning 2025-06-16 18:00 IST
    pub fn booking_request(&self, accessories: Vec<AccessorySelection>) -> CreateBookingRequest {
        CreateBookingRequest {
            cycle_id: self.cycle_id,
            partner_id: None,
            pickup_date: NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
            pickup_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            return_date: NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(),
            return_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            cycle_rental_cost: Decimal::from(600),
            insurance_cost: Decimal::from(50),
            security_deposit: Decimal::from(500),
            discount_amount: Decimal::from(20),
            accessories,
            profile: NewProfile {
                full_name: "Asha Rao".to_string(),
                phone_number: "9876543210".to_string(),
                email: Some("asha@example.com".to_string()),
                emergency_contact: None,
                id_document_url: None,
            },
        }
    }

    pub fn helmets(&self, quantity: i32) -> Vec<AccessorySelection> {
        vec![AccessorySelection {
            accessory_id: self.accessory_id,
            quantity,
            price_per_day: Decimal::from(30),
        }]
    }

    /// A booking created well before pickup
    pub async fn booked(&self, user_id: Uuid) -> BookingDetails {
        self.bookings
            .create_booking(
                user_id,
                self.booking_request(self.helmets(1)),
                ts("2025-06-10T04:30:00Z"),
            )
            .await
            .unwrap()
    }
}
