//! Pricing rules: GST, accessory line totals, booking totals and rental days

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use super::model::{AccessorySelection, BookingAccessoryLine, NewAccessoryLine};

/// GST rate applied to the rental + accessories subtotal (18%)
pub fn gst_rate() -> Decimal {
    Decimal::new(18, 2)
}

/// Round a monetary amount to paise
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// GST owed on `cycle_rental_cost + accessories_cost`
pub fn gst_on(cycle_rental_cost: Decimal, accessories_cost: Decimal) -> Decimal {
    round_money((cycle_rental_cost + accessories_cost) * gst_rate())
}

/// `quantity * price_per_day * days`
pub fn line_total(quantity: i32, price_per_day: Decimal, days: i32) -> Decimal {
    round_money(Decimal::from(quantity) * price_per_day * Decimal::from(days))
}

/// Number of billable days between pickup and return dates, at least one
pub fn rental_days(pickup_date: NaiveDate, return_date: NaiveDate) -> i32 {
    let days = (return_date - pickup_date).num_days();
    days.clamp(1, i32::MAX as i64) as i32
}

/// Price client accessory selections for a rental of `days` days
pub fn price_accessories(selections: &[AccessorySelection], days: i32) -> Vec<NewAccessoryLine> {
    selections
        .iter()
        .map(|selection| NewAccessoryLine {
            accessory_id: selection.accessory_id,
            quantity: selection.quantity,
            days,
            price_per_day: selection.price_per_day,
            total_cost: line_total(selection.quantity, selection.price_per_day, days),
        })
        .collect()
}

pub fn accessories_cost(lines: &[NewAccessoryLine]) -> Decimal {
    lines.iter().map(|line| line.total_cost).sum()
}

pub fn persisted_accessories_cost(lines: &[BookingAccessoryLine]) -> Decimal {
    lines.iter().map(|line| line.total_cost).sum()
}

/// Monetary breakdown of a booking.
///
/// `total()` is the only way a total is produced, so every write path keeps
/// `total_amount == cycle + accessories + insurance + gst + deposit - discount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CostBreakdown {
    pub cycle_rental_cost: Decimal,
    pub accessories_cost: Decimal,
    pub insurance_cost: Decimal,
    pub gst: Decimal,
    pub security_deposit: Decimal,
    pub discount_amount: Decimal,
}

impl CostBreakdown {
    /// Build a breakdown, deriving GST from the rental and accessories subtotal
    pub fn compute(
        cycle_rental_cost: Decimal,
        accessories_cost: Decimal,
        insurance_cost: Decimal,
        security_deposit: Decimal,
        discount_amount: Decimal,
    ) -> Self {
        Self {
            cycle_rental_cost: round_money(cycle_rental_cost),
            accessories_cost: round_money(accessories_cost),
            insurance_cost: round_money(insurance_cost),
            gst: gst_on(cycle_rental_cost, accessories_cost),
            security_deposit: round_money(security_deposit),
            discount_amount: round_money(discount_amount),
        }
    }

    /// Same breakdown with a new accessories cost and the GST recomputed
    pub fn with_accessories_cost(&self, accessories_cost: Decimal) -> Self {
        Self::compute(
            self.cycle_rental_cost,
            accessories_cost,
            self.insurance_cost,
            self.security_deposit,
            self.discount_amount,
        )
    }

    pub fn total(&self) -> Decimal {
        self.cycle_rental_cost
            + self.accessories_cost
            + self.insurance_cost
            + self.gst
            + self.security_deposit
            - self.discount_amount
    }

    /// A discount may not push the total below zero
    pub fn check(&self) -> Result<(), String> {
        if self.total() < Decimal::ZERO {
            return Err("Discount exceeds the booking amount".to_string());
        }
        Ok(())
    }
}
