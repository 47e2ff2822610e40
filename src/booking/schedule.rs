//! Business-local time and the time windows that gate booking changes

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

/// Self-service edits close this long before pickup
pub const EDIT_CUTOFF_HOURS: i64 = 2;

/// Cancellations at least this far ahead of pickup pay the flat fee only
pub const FREE_CANCELLATION_HOURS: i64 = 24;

/// Indian Standard Time, UTC+05:30
pub const IST_OFFSET_MINUTES: i32 = 330;

/// Converts the pickup/return wall-clock values stored on bookings into instants.
///
/// The business runs on a fixed offset from UTC with no daylight saving.
#[derive(Debug, Clone, Copy)]
pub struct BusinessClock {
    offset: Duration,
}

impl BusinessClock {
    /// `None` unless the offset is strictly within one day
    pub fn new(utc_offset_minutes: i32) -> Option<Self> {
        (utc_offset_minutes.abs() < 24 * 60).then(|| Self {
            offset: Duration::minutes(i64::from(utc_offset_minutes)),
        })
    }

    pub fn ist() -> Self {
        Self {
            offset: Duration::minutes(i64::from(IST_OFFSET_MINUTES)),
        }
    }

    pub fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        Utc.from_utc_datetime(&(date.and_time(time) - self.offset))
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        (now.naive_utc() + self.offset).date()
    }
}

impl Default for BusinessClock {
    fn default() -> Self {
        Self::ist()
    }
}

/// True while `now` is still more than the edit cutoff ahead of pickup
pub fn edit_window_open(pickup_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    pickup_at - now > Duration::hours(EDIT_CUTOFF_HOURS)
}

/// Generate a booking reference: `BK` + local `yyMMdd` + 8 random hex chars.
///
/// The random part comes from a v4 uuid and the column carries a UNIQUE
/// constraint, so two creations in the same instant do not collide silently.
pub fn generate_booking_id(clock: &BusinessClock, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("BK{}{}", clock.today(now).format("%y%m%d"), suffix)
}
