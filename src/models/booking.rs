use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Durations offered by the booking view, in hours.
pub const DURATION_MENU: [u32; 4] = [1, 2, 4, 8];
pub const DEFAULT_DURATION_HOURS: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: String,
    pub user_id: Option<String>,
    pub lot_id: String,
    pub lot_name: String,
    pub slot_id: String,
    pub vehicle_number: String,
    pub customer_name: String,
    pub duration_hours: u32,
    pub total_price: f64,
    pub status: BookingStatus,
    pub booking_time: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

impl Booking {
    pub fn ends_at(&self) -> NaiveDateTime {
        self.booking_time + Duration::hours(i64::from(self.duration_hours))
    }

    /// True if this booking still holds its slot somewhere in `[start, end)`.
    pub fn holds_slot_during(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.status == BookingStatus::Active && self.booking_time < end && start < self.ends_at()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" | "confirmed" => BookingStatus::Active,
            "completed" => BookingStatus::Completed,
            "cancelled" => BookingStatus::Cancelled,
            _ => BookingStatus::Pending,
        }
    }
}

/// A booking as written by the submit step, before the store assigns
/// timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBooking {
    pub id: String,
    pub user_id: Option<String>,
    pub lot_id: String,
    pub lot_name: String,
    pub slot_id: String,
    pub vehicle_number: String,
    pub customer_name: String,
    pub duration_hours: u32,
    pub total_price: f64,
}

impl NewBooking {
    /// The window the slot is held for when the booking starts at `start`.
    pub fn window_from(&self, start: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        (start, start + Duration::hours(i64::from(self.duration_hours)))
    }
}

pub fn is_offered_duration(hours: u32) -> bool {
    DURATION_MENU.contains(&hours)
}
