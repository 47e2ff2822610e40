//! Booking models and request/response DTOs

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use super::pricing::CostBreakdown;
use crate::models::NewProfile;

/// Booking record
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    /// Human-readable booking reference, e.g. `BK250614A1B2C3D4`
    pub booking_id: String,
    pub user_id: Uuid,
    pub cycle_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub pickup_date: NaiveDate,
    pub pickup_time: NaiveTime,
    pub return_date: NaiveDate,
    pub return_time: NaiveTime,
    pub cycle_rental_cost: Decimal,
    pub accessories_cost: Decimal,
    pub insurance_cost: Decimal,
    pub gst: Decimal,
    pub security_deposit: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_provider: Option<String>,
    pub payment_order_id: Option<String>,
    pub payment_transaction_id: Option<String>,
    pub payment_signature: Option<String>,
    pub payment_method: Option<String>,
    pub cancellation_requested_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub cancellation_status: Option<CancellationStatus>,
    pub cancellation_fee: Option<Decimal>,
    pub refund_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn costs(&self) -> CostBreakdown {
        CostBreakdown {
            cycle_rental_cost: self.cycle_rental_cost,
            accessories_cost: self.accessories_cost,
            insurance_cost: self.insurance_cost,
            gst: self.gst,
            security_deposit: self.security_deposit,
            discount_amount: self.discount_amount,
        }
    }

    /// Copy a cost breakdown onto the booking, keeping `total_amount` in step
    pub fn apply_costs(&mut self, costs: &CostBreakdown) {
        self.cycle_rental_cost = costs.cycle_rental_cost;
        self.accessories_cost = costs.accessories_cost;
        self.insurance_cost = costs.insurance_cost;
        self.gst = costs.gst;
        self.security_deposit = costs.security_deposit;
        self.discount_amount = costs.discount_amount;
        self.total_amount = costs.total();
    }

    pub fn total_is_consistent(&self) -> bool {
        self.total_amount == self.costs().total()
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Completed
    }
}

/// Booking lifecycle status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

/// Payment status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// Cancellation request status, decided by an admin
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "cancellation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CancellationStatus {
    Requested,
    Approved,
    Rejected,
}

/// Accessory line item on a booking
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct BookingAccessoryLine {
    pub id: Uuid,
    /// Internal booking row id
    pub booking_id: Uuid,
    pub accessory_id: Uuid,
    pub quantity: i32,
    pub days: i32,
    pub price_per_day: Decimal,
    pub total_cost: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Accessory selection as sent by the client
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AccessorySelection {
    pub accessory_id: Uuid,
    #[validate(range(min = 1, max = 20))]
    pub quantity: i32,
    pub price_per_day: Decimal,
}

/// Request DTO for creating a booking
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub cycle_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub pickup_date: NaiveDate,
    pub pickup_time: NaiveTime,
    pub return_date: NaiveDate,
    pub return_time: NaiveTime,
    pub cycle_rental_cost: Decimal,
    #[serde(default)]
    pub insurance_cost: Decimal,
    #[serde(default)]
    pub security_deposit: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    #[validate]
    pub accessories: Vec<AccessorySelection>,
    #[validate]
    pub profile: NewProfile,
}

impl CreateBookingRequest {
    /// Checks that need more than field-level validation
    pub fn check(&self) -> Result<(), String> {
        if self.return_date < self.pickup_date
            || (self.return_date == self.pickup_date && self.return_time <= self.pickup_time)
        {
            return Err("Return must be after pickup".to_string());
        }
        let amounts = [
            ("cycle_rental_cost", self.cycle_rental_cost),
            ("insurance_cost", self.insurance_cost),
            ("security_deposit", self.security_deposit),
            ("discount_amount", self.discount_amount),
        ];
        for (name, value) in amounts {
            if value < Decimal::ZERO {
                return Err(format!("{} must not be negative", name));
            }
        }
        check_selections(&self.accessories)
    }
}

/// Prices must be non-negative and each accessory may appear only once
pub fn check_selections(selections: &[AccessorySelection]) -> Result<(), String> {
    if let Some(line) = selections
        .iter()
        .find(|line| line.price_per_day < Decimal::ZERO)
    {
        return Err(format!(
            "Accessory {} has a negative price",
            line.accessory_id
        ));
    }
    let mut seen = std::collections::HashSet::new();
    if let Some(line) = selections.iter().find(|line| !seen.insert(line.accessory_id)) {
        return Err(format!(
            "Accessory {} is listed more than once",
            line.accessory_id
        ));
    }
    Ok(())
}

/// A fully-priced booking ready to be inserted
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: Uuid,
    pub booking_id: String,
    pub user_id: Uuid,
    pub cycle_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub pickup_date: NaiveDate,
    pub pickup_time: NaiveTime,
    pub return_date: NaiveDate,
    pub return_time: NaiveTime,
    pub costs: CostBreakdown,
    pub created_at: DateTime<Utc>,
}

impl NewBooking {
    /// The row as persisted: `payment_status=pending`, `booking_status=confirmed`
    pub fn into_booking(self) -> Booking {
        let total_amount = self.costs.total();
        Booking {
            id: self.id,
            booking_id: self.booking_id,
            user_id: self.user_id,
            cycle_id: self.cycle_id,
            partner_id: self.partner_id,
            pickup_date: self.pickup_date,
            pickup_time: self.pickup_time,
            return_date: self.return_date,
            return_time: self.return_time,
            cycle_rental_cost: self.costs.cycle_rental_cost,
            accessories_cost: self.costs.accessories_cost,
            insurance_cost: self.costs.insurance_cost,
            gst: self.costs.gst,
            security_deposit: self.costs.security_deposit,
            discount_amount: self.costs.discount_amount,
            total_amount,
            booking_status: BookingStatus::Confirmed,
            payment_status: PaymentStatus::Pending,
            payment_provider: None,
            payment_order_id: None,
            payment_transaction_id: None,
            payment_signature: None,
            payment_method: None,
            cancellation_requested_at: None,
            cancellation_reason: None,
            cancellation_status: None,
            cancellation_fee: None,
            refund_amount: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// A priced accessory line ready to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccessoryLine {
    pub accessory_id: Uuid,
    pub quantity: i32,
    pub days: i32,
    pub price_per_day: Decimal,
    pub total_cost: Decimal,
}

impl NewAccessoryLine {
    pub fn into_line(self, booking_row_id: Uuid, created_at: DateTime<Utc>) -> BookingAccessoryLine {
        BookingAccessoryLine {
            id: Uuid::new_v4(),
            booking_id: booking_row_id,
            accessory_id: self.accessory_id,
            quantity: self.quantity,
            days: self.days,
            price_per_day: self.price_per_day,
            total_cost: self.total_cost,
            created_at,
        }
    }
}

/// Booking together with its accessory lines
#[derive(Debug, Serialize, Clone)]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub accessories: Vec<BookingAccessoryLine>,
}

/// Request DTO for revising a booking's accessories
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModifyAccessoriesRequest {
    #[validate(length(min = 1))]
    pub booking_id: String,
    #[validate]
    pub accessories: Vec<AccessorySelection>,
    /// Difference the client displayed; the server recomputes it
    pub price_difference: Option<Decimal>,
}

/// Response DTO for an accessory revision
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyAccessoriesResponse {
    pub success: bool,
    pub price_difference: Decimal,
    pub message: String,
}

/// Request DTO for a cancellation request
#[derive(Debug, Deserialize, Validate)]
pub struct CancelBookingRequest {
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

/// Query parameters for listing bookings
#[derive(Debug, Default, Deserialize)]
pub struct ListBookingsQuery {
    pub booking_status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub cancellation_status: Option<CancellationStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ListBookingsQuery {
    /// Normalized `(limit, offset)`
    pub fn window(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(20).clamp(1, 100);
        (limit, (page - 1) * limit)
    }
}

/// Admin edit of a booking
#[derive(Debug, Default, Deserialize)]
pub struct AdminBookingUpdate {
    pub booking_status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub insurance_cost: Option<Decimal>,
    pub security_deposit: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
}

/// Admin decision on a pending cancellation request
#[derive(Debug, Deserialize)]
pub struct CancellationDecisionRequest {
    pub approve: bool,
}
