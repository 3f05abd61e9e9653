pub mod rest;
pub mod sqlite;

use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Booking, NewBooking, ParkingLot};

/// Failure classes decided once at the store boundary. Callers branch on
/// these, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    /// Table or row missing.
    NotFound,
    /// Network trouble, timeouts, busy database. Safe to retry.
    Transient,
    Unauthorized,
    /// Uniqueness or conditional-update violation.
    Conflict,
    Unknown,
}

impl StoreErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorKind::NotFound => "not found",
            StoreErrorKind::Transient => "transient",
            StoreErrorKind::Unauthorized => "unauthorized",
            StoreErrorKind::Conflict => "conflict",
            StoreErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("store error ({kind}): {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Transient, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Conflict, message)
    }
}

/// What happened to the lot's counter after a booking row was written.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SlotCountUpdate {
    Decremented { remaining: u32 },
    /// Counter was already zero and stays there.
    AlreadyEmpty,
    /// Booking stands but the counter was not touched.
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingCommit {
    pub booking: Booking,
    pub slots: SlotCountUpdate,
}

#[async_trait]
pub trait ParkingStore: Send + Sync {
    async fn list_lots(&self) -> Result<Vec<ParkingLot>, StoreError>;

    /// Bookings for one user, newest first.
    async fn list_bookings(&self, user_id: &str) -> Result<Vec<Booking>, StoreError>;

    async fn insert_booking(&self, booking: &NewBooking) -> Result<Booking, StoreError>;

    /// Conditional decrement; never drops below zero.
    async fn decrement_available_slots(&self, lot_id: &str)
        -> Result<SlotCountUpdate, StoreError>;

    /// True when `commit_booking` runs as one transaction that cannot be
    /// left half done.
    fn commits_atomically(&self) -> bool {
        false
    }

    /// Writes the booking and takes one slot from the lot.
    ///
    /// The default runs the two writes in sequence: if the insert fails
    /// nothing is written; if only the decrement fails the booking stands
    /// and the outcome is `SlotCountUpdate::Failed`. Stores that can run
    /// both in one transaction override this.
    async fn commit_booking(&self, booking: &NewBooking) -> Result<BookingCommit, StoreError> {
        let booking = self.insert_booking(booking).await?;
        let slots = match self.decrement_available_slots(&booking.lot_id).await {
            Ok(update) => update,
            Err(e) => SlotCountUpdate::Failed {
                reason: e.to_string(),
            },
        };
        Ok(BookingCommit { booking, slots })
    }
}
