//! Booking domain: models, pricing, lifecycle service, modification and cancellation

mod cancellation;
mod model;
mod modification;
pub mod pricing;
pub mod schedule;
mod service;

pub use cancellation::{cancellation_quote, CancellationQuote, CANCELLATION_FEE};
pub use model::*;
pub use pricing::CostBreakdown;
pub use schedule::BusinessClock;
pub use service::BookingService;
