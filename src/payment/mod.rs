//! Payment gateways and booking payment reconciliation

mod gateway;
mod model;
mod phonepe;
mod razorpay;
mod service;

pub use gateway::{GatewayRegistry, PaymentError, PaymentGateway};
pub use model::*;
pub use phonepe::{to_paise, PhonePeGateway};
pub use razorpay::{payment_signature, signature_matches, RazorpayGateway};
pub use service::{payment_sweeper, PaymentService};
