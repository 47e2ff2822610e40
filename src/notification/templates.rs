//! Message bodies for each notification kind

use std::fmt::Write;

use crate::booking::{Booking, BookingAccessoryLine};
use crate::models::Profile;

/// Everything a message needs, fetched fresh for each notification
#[derive(Debug, Clone)]
pub struct BookingContext {
    pub booking: Booking,
    pub profile: Option<Profile>,
    pub accessories: Vec<BookingAccessoryLine>,
}

impl BookingContext {
    fn customer_name(&self) -> &str {
        self.profile
            .as_ref()
            .map(|profile| profile.full_name.as_str())
            .unwrap_or("Customer")
    }

    fn schedule(&self) -> String {
        let b = &self.booking;
        format!(
            "Pickup: {} {}\nReturn: {} {}",
            b.pickup_date.format("%d %b %Y"),
            b.pickup_time.format("%H:%M"),
            b.return_date.format("%d %b %Y"),
            b.return_time.format("%H:%M"),
        )
    }

    fn accessory_summary(&self) -> String {
        if self.accessories.is_empty() {
            return "None".to_string();
        }
        let units: i32 = self.accessories.iter().map(|line| line.quantity).sum();
        format!("{} item(s), {} unit(s)", self.accessories.len(), units)
    }
}

pub fn customer_confirmation(ctx: &BookingContext) -> String {
    let b = &ctx.booking;
    let mut body = String::new();
    let _ = writeln!(body, "Hi {}, your cycle booking is confirmed!", ctx.customer_name());
    let _ = writeln!(body, "Booking ID: {}", b.booking_id);
    let _ = writeln!(body, "{}", ctx.schedule());
    let _ = writeln!(body, "Accessories: {}", ctx.accessory_summary());
    let _ = writeln!(body, "Amount paid: Rs. {}", b.total_amount);
    let _ = write!(
        body,
        "Security deposit of Rs. {} is refundable on return.",
        b.security_deposit
    );
    body
}

pub fn admin_new_booking(ctx: &BookingContext) -> String {
    let b = &ctx.booking;
    let mut body = String::new();
    let _ = writeln!(body, "New paid booking {}", b.booking_id);
    let _ = writeln!(body, "Customer: {}", ctx.customer_name());
    if let Some(profile) = &ctx.profile {
        let _ = writeln!(body, "Phone: {}", profile.phone_number);
    }
    let _ = writeln!(body, "{}", ctx.schedule());
    let _ = writeln!(body, "Accessories: {}", ctx.accessory_summary());
    let _ = write!(
        body,
        "Total: Rs. {} via {}",
        b.total_amount,
        b.payment_provider.as_deref().unwrap_or("unknown")
    );
    body
}

pub fn admin_modification(ctx: &BookingContext) -> String {
    let b = &ctx.booking;
    let mut body = String::new();
    let _ = writeln!(body, "Booking {} was modified", b.booking_id);
    let _ = writeln!(body, "Customer: {}", ctx.customer_name());
    let _ = writeln!(body, "{}", ctx.schedule());
    let _ = writeln!(body, "Accessories now: {}", ctx.accessory_summary());
    let _ = write!(
        body,
        "Accessories cost: Rs. {}, new total: Rs. {}",
        b.accessories_cost, b.total_amount
    );
    body
}
